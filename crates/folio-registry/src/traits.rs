use folio_types::{Dictionary, FormatVersion, Payload};

use crate::entry::{IdentityEntry, IdentityTable};
use crate::error::RegistryResult;

/// What a backing store reports when it is opened.
#[derive(Clone, Debug)]
pub struct TrailerSnapshot {
    /// Version from the store header.
    pub version: FormatVersion,
    /// Newest trailer dictionary.
    pub trailer: Dictionary,
    /// One entry per discovered object number, newest section winning.
    pub table: IdentityTable,
}

/// Read side of a backing store, consumed by the registry.
///
/// Implementations must satisfy these invariants:
/// - `read_trailer()` builds the identity table eagerly but loads no payload.
/// - `materialize()` is only called for in-use entries, at most once per
///   number per registry (the registry caches the result).
/// - A failed `materialize()` is not fatal: the registry degrades the entry
///   to free and logs it.
pub trait BackingReader {
    /// Read the header version, the newest trailer and the identity table.
    fn read_trailer(&self) -> RegistryResult<TrailerSnapshot>;

    /// Parse the payload stored for `entry`.
    fn materialize(&self, entry: &IdentityEntry) -> RegistryResult<Payload>;
}

impl<R: BackingReader + ?Sized> BackingReader for std::rc::Rc<R> {
    fn read_trailer(&self) -> RegistryResult<TrailerSnapshot> {
        (**self).read_trailer()
    }

    fn materialize(&self, entry: &IdentityEntry) -> RegistryResult<Payload> {
        (**self).materialize(entry)
    }
}
