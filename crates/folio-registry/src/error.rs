use folio_types::ObjectRef;

/// Errors from registry operations.
///
/// Missing or corrupt original entries are not errors: the registry
/// degrades them to free entries. Everything here is either a caller
/// contract violation or a backing-store failure surfaced at open time.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The requested number is above the allocation high-water mark.
    #[error("object number {number} out of range (high-water mark {high_water})")]
    OutOfRange { number: u32, high_water: u32 },

    /// An importer bound to one registry was used against another.
    #[error("importer is bound to a different target registry")]
    IncompatibleTarget,

    /// The handle was displaced by `update`/`remove` and no longer belongs
    /// to a registry.
    #[error("handle for {0} is detached from its registry")]
    Detached(ObjectRef),

    /// The number was freed with the unreusable generation.
    #[error("object {number} was freed permanently and cannot be revived")]
    Unreusable { number: u32 },

    /// The backing reader failed.
    #[error("backing reader error: {0}")]
    Reader(String),
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
