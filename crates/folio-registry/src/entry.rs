use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use folio_types::{ObjectRef, UNREUSABLE_GENERATION};

/// Whether a cross-reference slot holds a live object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Usage {
    Free,
    InUse,
}

impl std::fmt::Display for Usage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::InUse => write!(f, "in-use"),
        }
    }
}

/// On-disk bookkeeping for one object slot.
///
/// `offset` is the byte position of the original `N G obj` header for
/// in-use entries read from a backing store. It is meaningless (zero) for
/// objects created in the session. Under the legacy free-list scheme the
/// writer reuses the field of free entries as the next-free link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub number: u32,
    pub generation: u32,
    pub offset: u64,
    pub usage: Usage,
}

impl IdentityEntry {
    pub fn in_use(number: u32, generation: u32, offset: u64) -> Self {
        Self {
            number,
            generation,
            offset,
            usage: Usage::InUse,
        }
    }

    pub fn free(number: u32, generation: u32) -> Self {
        Self {
            number,
            generation,
            offset: 0,
            usage: Usage::Free,
        }
    }

    /// Entry 0: the permanently free head of the historical free list.
    pub fn reserved() -> Self {
        Self::free(0, UNREUSABLE_GENERATION)
    }

    pub fn is_in_use(&self) -> bool {
        self.usage == Usage::InUse
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.number, self.generation)
    }
}

/// Identity table discovered when a backing store is opened.
///
/// Keyed by object number. The table may be sparse; lookups of a missing
/// number return `None` and the registry synthesizes a free entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityTable {
    entries: BTreeMap<u32, IdentityEntry>,
}

impl IdentityTable {
    /// Table containing only the reserved entry 0.
    pub fn new() -> Self {
        let mut table = Self::default();
        table.insert(IdentityEntry::reserved());
        table
    }

    /// Insert or replace the entry for `entry.number`.
    pub fn insert(&mut self, entry: IdentityEntry) -> Option<IdentityEntry> {
        self.entries.insert(entry.number, entry)
    }

    /// Insert only if no entry exists yet for the number.
    ///
    /// Used when merging older cross-reference sections under newer ones.
    pub fn insert_if_absent(&mut self, entry: IdentityEntry) -> bool {
        match self.entries.entry(entry.number) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, number: u32) -> Option<&IdentityEntry> {
        self.entries.get(&number)
    }

    /// Highest object number present, or 0 for an empty table.
    pub fn max_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Number of entries present (free ones included).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of in-use entries.
    pub fn live_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_in_use()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityEntry> {
        self.entries.values()
    }
}

impl FromIterator<IdentityEntry> for IdentityTable {
    fn from_iter<I: IntoIterator<Item = IdentityEntry>>(iter: I) -> Self {
        let mut table = Self::default();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}
