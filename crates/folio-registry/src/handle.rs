use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use folio_types::{ObjectRef, Payload};

use crate::entry::{IdentityEntry, Usage};

/// Process-unique identifier of one [`ObjectRegistry`](crate::ObjectRegistry).
///
/// Handles record the id of the registry that owns them; importers record
/// the id of the registry they were bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(u64);

impl RegistryId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry#{}", self.0)
    }
}

/// Whether a handle must be written on the next save.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Materialized from the backing store and not replaced since.
    /// Written only by a full rewrite.
    Original,
    /// Allocated, updated, removed or imported in this session.
    /// Always written.
    Modified,
}

/// In-memory representative of one object identity.
///
/// Handles are shared as `Rc<ObjectHandle>`; the registry hands out the
/// same instance for a number until that number is updated or removed.
/// A displaced handle is detached and refuses further resolution.
pub struct ObjectHandle {
    identity: IdentityEntry,
    payload: RefCell<Option<Payload>>,
    origin: Origin,
    owner: Cell<Option<RegistryId>>,
}

impl ObjectHandle {
    pub(crate) fn new(
        identity: IdentityEntry,
        payload: Option<Payload>,
        origin: Origin,
        owner: RegistryId,
    ) -> Self {
        Self {
            identity,
            payload: RefCell::new(payload),
            origin,
            owner: Cell::new(Some(owner)),
        }
    }

    pub fn identity(&self) -> &IdentityEntry {
        &self.identity
    }

    pub fn number(&self) -> u32 {
        self.identity.number
    }

    pub fn generation(&self) -> u32 {
        self.identity.generation
    }

    pub fn object_ref(&self) -> ObjectRef {
        self.identity.object_ref()
    }

    pub fn usage(&self) -> Usage {
        self.identity.usage
    }

    pub fn is_in_use(&self) -> bool {
        self.identity.is_in_use()
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_modified(&self) -> bool {
        self.origin == Origin::Modified
    }

    /// Borrow the payload. `None` for free entries and for an imported
    /// handle whose deep copy is still in progress.
    pub fn payload(&self) -> Ref<'_, Option<Payload>> {
        self.payload.borrow()
    }

    /// Owned copy of the payload.
    pub fn payload_cloned(&self) -> Option<Payload> {
        self.payload.borrow().clone()
    }

    /// The registry that currently owns this handle, if still attached.
    pub fn owner(&self) -> Option<RegistryId> {
        self.owner.get()
    }

    pub fn is_attached(&self) -> bool {
        self.owner.get().is_some()
    }

    pub(crate) fn detach(&self) {
        self.owner.set(None);
    }

    pub(crate) fn set_payload(&self, payload: Payload) {
        *self.payload.borrow_mut() = Some(payload);
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("ref", &self.object_ref())
            .field("usage", &self.identity.usage)
            .field("origin", &self.origin)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_ids_are_unique() {
        let a = RegistryId::next();
        let b = RegistryId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn detach_clears_owner() {
        let owner = RegistryId::next();
        let handle = ObjectHandle::new(
            IdentityEntry::in_use(4, 0, 0),
            Some(Payload::Integer(1)),
            Origin::Modified,
            owner,
        );
        assert_eq!(handle.owner(), Some(owner));
        handle.detach();
        assert!(!handle.is_attached());
        // The payload is still readable for bookkeeping.
        assert_eq!(handle.payload_cloned(), Some(Payload::Integer(1)));
    }

    #[test]
    fn set_payload_fills_placeholder() {
        let handle = ObjectHandle::new(
            IdentityEntry::in_use(2, 0, 0),
            None,
            Origin::Modified,
            RegistryId::next(),
        );
        assert!(handle.payload().is_none());
        handle.set_payload(Payload::Boolean(true));
        assert_eq!(*handle.payload(), Some(Payload::Boolean(true)));
    }

    #[test]
    fn debug_format() {
        let handle = ObjectHandle::new(
            IdentityEntry::free(3, 1),
            None,
            Origin::Original,
            RegistryId::next(),
        );
        let debug = format!("{handle:?}");
        assert!(debug.contains("ObjectHandle"));
        assert!(debug.contains("Free"));
    }
}
