use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use folio_types::{ObjectRef, Payload, MAX_GENERATION, MAX_OBJECT_NUMBER, UNREUSABLE_GENERATION};

use crate::cloner::Importer;
use crate::entry::{IdentityEntry, IdentityTable, Usage};
use crate::error::{RegistryError, RegistryResult};
use crate::handle::{ObjectHandle, Origin, RegistryId};
use crate::traits::BackingReader;

/// What `remove` does to the generation of a freed number.
///
/// Allocation never reuses a number under either policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReusePolicy {
    /// Free with the unreusable generation; no free list is maintained.
    #[default]
    NeverRecycle,
    /// Free with `generation + 1` and let the writer link free entries
    /// through object 0, as older revisions of the format expect.
    LegacyFreeList,
}

/// Key of the import dedup cache: the foreign registry plus the foreign
/// reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ForeignKey {
    registry: RegistryId,
    reference: ObjectRef,
}

/// Table of indirect objects for one session.
///
/// Numbers are looked up first in `modified` (allocated, updated, removed
/// or imported this session), then in `woken` (originals already
/// materialized), and only then materialized from the backing reader.
/// At most one of the two maps holds a number at any time, so `get`
/// always returns the canonical handle.
///
/// The registry is `!Send` and `!Sync`: handles are `Rc`-shared and the
/// wake-up cache uses a `RefCell`. Run one registry per thread.
pub struct ObjectRegistry {
    id: RegistryId,
    policy: ReusePolicy,
    reader: Option<Box<dyn BackingReader>>,
    table: IdentityTable,
    modified: BTreeMap<u32, Rc<ObjectHandle>>,
    woken: RefCell<BTreeMap<u32, Rc<ObjectHandle>>>,
    imported: HashMap<ForeignKey, u32>,
    last_number: u32,
}

impl ObjectRegistry {
    /// Create an empty registry for a new document.
    pub fn new(policy: ReusePolicy) -> Self {
        Self::build(None, IdentityTable::new(), policy)
    }

    /// Create a registry over an existing backing store.
    ///
    /// `table` is the identity table reported by the reader. No payload is
    /// loaded until the first `get` of each number.
    pub fn with_reader(
        reader: Box<dyn BackingReader>,
        table: IdentityTable,
        policy: ReusePolicy,
    ) -> Self {
        Self::build(Some(reader), table, policy)
    }

    fn build(
        reader: Option<Box<dyn BackingReader>>,
        mut table: IdentityTable,
        policy: ReusePolicy,
    ) -> Self {
        if table.max_number() > MAX_OBJECT_NUMBER {
            let before = table.len();
            table = table
                .iter()
                .filter(|entry| entry.number <= MAX_OBJECT_NUMBER)
                .copied()
                .collect();
            warn!(
                discarded = before - table.len(),
                limit = MAX_OBJECT_NUMBER,
                "ignoring identity entries above the object number limit"
            );
        }
        table.insert(IdentityEntry::reserved());
        let last_number = table.max_number();
        Self {
            id: RegistryId::next(),
            policy,
            reader,
            table,
            modified: BTreeMap::new(),
            woken: RefCell::new(BTreeMap::new()),
            imported: HashMap::new(),
            last_number,
        }
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    pub fn policy(&self) -> ReusePolicy {
        self.policy
    }

    /// Highest number ever allocated or read in this session.
    pub fn high_water(&self) -> u32 {
        self.last_number
    }

    /// The identity table read from the backing store.
    pub fn table(&self) -> &IdentityTable {
        &self.table
    }

    pub fn has_backing_store(&self) -> bool {
        self.reader.is_some()
    }

    // ---------------------------------------------------------------
    // Allocation and lookup
    // ---------------------------------------------------------------

    /// Register `payload` under a fresh number.
    ///
    /// Numbers come from a monotonic counter and are never reused in a
    /// session, even after `remove`.
    pub fn allocate(&mut self, payload: Payload) -> Rc<ObjectHandle> {
        self.allocate_slot(Some(payload))
    }

    fn allocate_slot(&mut self, payload: Option<Payload>) -> Rc<ObjectHandle> {
        self.last_number += 1;
        let number = self.last_number;
        let handle = Rc::new(ObjectHandle::new(
            IdentityEntry::in_use(number, 0, 0),
            payload,
            Origin::Modified,
            self.id,
        ));
        self.modified.insert(number, Rc::clone(&handle));
        debug!(number, "allocated object");
        handle
    }

    /// The canonical handle for `number`.
    ///
    /// Original objects are materialized from the backing reader on first
    /// access and cached. Numbers with no identity entry, or whose entry
    /// fails to materialize, come back as free handles.
    pub fn get(&self, number: u32) -> RegistryResult<Rc<ObjectHandle>> {
        if number > self.last_number {
            return Err(RegistryError::OutOfRange {
                number,
                high_water: self.last_number,
            });
        }
        if let Some(handle) = self.modified.get(&number) {
            return Ok(Rc::clone(handle));
        }
        if let Some(handle) = self.woken.borrow().get(&number) {
            return Ok(Rc::clone(handle));
        }

        // No borrow of `woken` is held while the reader runs.
        let handle = Rc::new(self.wake(number));
        let mut woken = self.woken.borrow_mut();
        Ok(Rc::clone(woken.entry(number).or_insert(handle)))
    }

    fn wake(&self, number: u32) -> ObjectHandle {
        let entry = match self.table.get(number) {
            Some(entry) => *entry,
            None => {
                debug!(number, "no identity entry; synthesizing free entry");
                IdentityEntry::free(number, 0)
            }
        };
        if !entry.is_in_use() {
            return ObjectHandle::new(entry, None, Origin::Original, self.id);
        }

        let materialized = match &self.reader {
            Some(reader) => reader.materialize(&entry),
            None => Err(RegistryError::Reader("no backing store".into())),
        };
        match materialized {
            Ok(payload) => {
                debug!(
                    number,
                    generation = entry.generation,
                    offset = entry.offset,
                    "woke object"
                );
                ObjectHandle::new(entry, Some(payload), Origin::Original, self.id)
            }
            Err(e) => {
                warn!(
                    number,
                    generation = entry.generation,
                    offset = entry.offset,
                    error = %e,
                    "unreadable object degraded to free"
                );
                ObjectHandle::new(
                    IdentityEntry::free(number, entry.generation),
                    None,
                    Origin::Original,
                    self.id,
                )
            }
        }
    }

    /// Resolve `reference` on behalf of `from`.
    ///
    /// Fails with `Detached` if `from` was displaced by `update`/`remove`.
    /// References to free numbers, to numbers above the high-water mark, or
    /// with a stale generation resolve to `None`.
    pub fn resolve(
        &self,
        from: &ObjectHandle,
        reference: ObjectRef,
    ) -> RegistryResult<Option<Rc<ObjectHandle>>> {
        match from.owner() {
            None => return Err(RegistryError::Detached(from.object_ref())),
            Some(owner) if owner != self.id => return Err(RegistryError::IncompatibleTarget),
            Some(_) => {}
        }
        self.lookup(reference)
    }

    /// Resolve a reference without an originating handle.
    pub fn lookup(&self, reference: ObjectRef) -> RegistryResult<Option<Rc<ObjectHandle>>> {
        if reference.number == 0 || reference.number > self.last_number {
            return Ok(None);
        }
        let handle = self.get(reference.number)?;
        if handle.is_in_use() && handle.generation() == reference.generation {
            Ok(Some(handle))
        } else {
            Ok(None)
        }
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Replace the payload of `number`, returning the displaced handle.
    ///
    /// The displaced handle is detached; the replacement is marked
    /// modified and keeps the number and generation. A number freed with
    /// the unreusable generation cannot be revived.
    pub fn update(&mut self, number: u32, payload: Payload) -> RegistryResult<Rc<ObjectHandle>> {
        let old = self.get(number)?;
        let generation = old.generation();
        if number == 0 || (!old.is_in_use() && generation >= UNREUSABLE_GENERATION) {
            return Err(RegistryError::Unreusable { number });
        }
        let replacement = Rc::new(ObjectHandle::new(
            IdentityEntry::in_use(number, generation, 0),
            Some(payload),
            Origin::Modified,
            self.id,
        ));
        self.replace(number, &old, replacement);
        debug!(number, generation, "updated object");
        Ok(old)
    }

    /// Free `number`, returning the handle it held.
    ///
    /// Freeing an already free number is a no-op that returns the existing
    /// handle. The generation of the freed entry follows the registry's
    /// [`ReusePolicy`].
    pub fn remove(&mut self, number: u32) -> RegistryResult<Rc<ObjectHandle>> {
        let current = self.get(number)?;
        if !current.is_in_use() {
            return Ok(current);
        }
        let generation = match self.policy {
            ReusePolicy::NeverRecycle => UNREUSABLE_GENERATION,
            ReusePolicy::LegacyFreeList => (current.generation() + 1).min(MAX_GENERATION),
        };
        let freed = Rc::new(ObjectHandle::new(
            IdentityEntry::free(number, generation),
            None,
            Origin::Modified,
            self.id,
        ));
        self.replace(number, &current, freed);
        debug!(number, generation, "removed object");
        Ok(current)
    }

    fn replace(&mut self, number: u32, old: &ObjectHandle, replacement: Rc<ObjectHandle>) {
        old.detach();
        self.woken.get_mut().remove(&number);
        self.modified.insert(number, replacement);
    }

    /// Import a handle owned by another registry.
    ///
    /// The same foreign handle always maps to the same local handle. On a
    /// cache miss the local number is allocated and recorded before the
    /// payload is deep-copied, so references back to `foreign` met during
    /// the copy resolve to the handle being filled.
    pub fn add_external(
        &mut self,
        foreign: &Rc<ObjectHandle>,
        importer: &mut Importer<'_>,
    ) -> RegistryResult<Rc<ObjectHandle>> {
        importer.check_target(self)?;
        let source = foreign
            .owner()
            .ok_or_else(|| RegistryError::Detached(foreign.object_ref()))?;
        if source != importer.source().id() {
            return Err(RegistryError::IncompatibleTarget);
        }

        let key = ForeignKey {
            registry: source,
            reference: foreign.object_ref(),
        };
        if let Some(local) = self.imported.get(&key).and_then(|n| self.modified.get(n)) {
            return Ok(Rc::clone(local));
        }

        let local = self.allocate_slot(None);
        self.imported.insert(key, local.number());
        debug!(
            foreign = %foreign.object_ref(),
            local = local.number(),
            "importing object"
        );

        let copied = match &*foreign.payload() {
            Some(payload) => importer.clone_payload(payload, self),
            None => Ok(Payload::Null),
        };
        match copied {
            Ok(payload) => {
                local.set_payload(payload);
                importer.record_copy();
                Ok(local)
            }
            Err(e) => {
                self.imported.remove(&key);
                self.remove(local.number())?;
                Err(e)
            }
        }
    }

    // ---------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------

    /// Usage of `number` in the current view, without materializing it.
    ///
    /// Unwoken originals report their table usage.
    pub fn usage_of(&self, number: u32) -> Usage {
        if let Some(handle) = self.modified.get(&number) {
            return handle.usage();
        }
        if let Some(handle) = self.woken.borrow().get(&number) {
            return handle.usage();
        }
        self.table
            .get(number)
            .map(|entry| entry.usage)
            .unwrap_or(Usage::Free)
    }

    /// Numbers with an identity entry or a session handle, in order.
    ///
    /// Gaps below the high-water mark are not listed; they read as free.
    pub fn known_numbers(&self) -> Vec<u32> {
        let mut numbers: BTreeSet<u32> = self.table.iter().map(|entry| entry.number).collect();
        numbers.extend(self.modified.keys().copied());
        numbers.remove(&0);
        numbers.into_iter().collect()
    }

    /// In-use numbers, in order.
    pub fn live_numbers(&self) -> Vec<u32> {
        self.known_numbers()
            .into_iter()
            .filter(|&n| self.usage_of(n) == Usage::InUse)
            .collect()
    }

    /// Count of in-use numbers.
    pub fn live_count(&self) -> usize {
        self.live_numbers().len()
    }

    /// `true` when no number is in use, however many free entries exist.
    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    /// `true` if anything was allocated, updated, removed or imported.
    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Handles that must be written on the next save, in number order.
    pub fn modified_handles(&self) -> impl Iterator<Item = &Rc<ObjectHandle>> {
        self.modified.values()
    }

    /// Number of originals materialized so far.
    pub fn woken_count(&self) -> usize {
        self.woken.borrow().len()
    }

    /// Number of distinct foreign handles imported.
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }

    /// Numbers reachable from `roots` by following references.
    ///
    /// Objects are woken lazily along the way. Dangling and stale
    /// references are skipped.
    pub fn reachable_from(&self, roots: &[ObjectRef]) -> RegistryResult<BTreeSet<u32>> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<ObjectRef> = roots.to_vec();
        while let Some(reference) = pending.pop() {
            if seen.contains(&reference.number) {
                continue;
            }
            let Some(handle) = self.lookup(reference)? else {
                continue;
            };
            seen.insert(reference.number);
            let payload = handle.payload();
            if let Some(payload) = payload.as_ref() {
                pending.extend(payload.references());
            }
        }
        Ok(seen)
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new(ReusePolicy::default())
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("high_water", &self.last_number)
            .field("modified", &self.modified.len())
            .field("woken", &self.woken.borrow().len())
            .field("imported", &self.imported.len())
            .finish()
    }
}
