use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use folio_types::{Dictionary, FormatVersion, Payload};

use crate::entry::{IdentityEntry, IdentityTable};
use crate::error::{RegistryError, RegistryResult};
use crate::traits::{BackingReader, TrailerSnapshot};

/// In-memory backing reader.
///
/// Intended for tests and embedding. Objects are held in a `BTreeMap` and
/// cloned on materialization; every call is counted per number so callers
/// can verify single materialization.
#[derive(Default)]
pub struct InMemoryReader {
    version: FormatVersion,
    trailer: Dictionary,
    table: IdentityTable,
    payloads: BTreeMap<u32, Payload>,
    corrupt: BTreeSet<u32>,
    calls: RefCell<BTreeMap<u32, usize>>,
}

impl InMemoryReader {
    /// Create an empty reader holding only the reserved entry 0.
    pub fn new() -> Self {
        Self {
            table: IdentityTable::new(),
            ..Self::default()
        }
    }

    /// Add an in-use object. The synthetic offset is `number * 100`.
    pub fn with_object(mut self, number: u32, generation: u32, payload: Payload) -> Self {
        self.table
            .insert(IdentityEntry::in_use(number, generation, u64::from(number) * 100));
        self.payloads.insert(number, payload);
        self
    }

    /// Add a free entry.
    pub fn with_free(mut self, number: u32, generation: u32) -> Self {
        self.table.insert(IdentityEntry::free(number, generation));
        self
    }

    /// Add an in-use entry whose materialization fails.
    pub fn with_corrupt(mut self, number: u32, generation: u32) -> Self {
        self.table
            .insert(IdentityEntry::in_use(number, generation, u64::from(number) * 100));
        self.corrupt.insert(number);
        self
    }

    pub fn with_trailer(mut self, trailer: Dictionary) -> Self {
        self.trailer = trailer;
        self
    }

    pub fn with_version(mut self, version: FormatVersion) -> Self {
        self.version = version;
        self
    }

    /// The identity table this reader reports.
    pub fn table(&self) -> &IdentityTable {
        &self.table
    }

    /// How many times `number` was materialized.
    pub fn materializations_of(&self, number: u32) -> usize {
        self.calls.borrow().get(&number).copied().unwrap_or(0)
    }

    /// Total materializations across all numbers.
    pub fn materializations(&self) -> usize {
        self.calls.borrow().values().sum()
    }
}

impl BackingReader for InMemoryReader {
    fn read_trailer(&self) -> RegistryResult<TrailerSnapshot> {
        Ok(TrailerSnapshot {
            version: self.version,
            trailer: self.trailer.clone(),
            table: self.table.clone(),
        })
    }

    fn materialize(&self, entry: &IdentityEntry) -> RegistryResult<Payload> {
        *self.calls.borrow_mut().entry(entry.number).or_insert(0) += 1;
        if self.corrupt.contains(&entry.number) {
            return Err(RegistryError::Reader(format!(
                "object {} is corrupt",
                entry.number
            )));
        }
        self.payloads.get(&entry.number).cloned().ok_or_else(|| {
            RegistryError::Reader(format!("object {} not present", entry.number))
        })
    }
}

impl std::fmt::Debug for InMemoryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryReader")
            .field("object_count", &self.payloads.len())
            .field("materializations", &self.materializations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_table_and_trailer() {
        let reader = InMemoryReader::new()
            .with_object(1, 0, Payload::Integer(5))
            .with_free(2, 3)
            .with_trailer(Dictionary::new().with("Size", 3i64));
        let snap = reader.read_trailer().unwrap();
        assert_eq!(snap.table.max_number(), 2);
        assert_eq!(snap.table.live_count(), 1);
        assert!(snap.trailer.contains_key("Size"));
        assert_eq!(snap.version, FormatVersion::default());
    }

    #[test]
    fn materialize_counts_calls() {
        let reader = InMemoryReader::new().with_object(1, 0, Payload::Null);
        let entry = *reader.table().get(1).unwrap();
        reader.materialize(&entry).unwrap();
        reader.materialize(&entry).unwrap();
        assert_eq!(reader.materializations_of(1), 2);
        assert_eq!(reader.materializations_of(9), 0);
    }

    #[test]
    fn corrupt_entry_fails() {
        let reader = InMemoryReader::new().with_corrupt(4, 0);
        let entry = *reader.table().get(4).unwrap();
        assert!(matches!(reader.materialize(&entry), Err(RegistryError::Reader(_))));
    }

    #[test]
    fn debug_format() {
        let reader = InMemoryReader::new().with_object(1, 0, Payload::Null);
        let debug = format!("{reader:?}");
        assert!(debug.contains("InMemoryReader"));
        assert!(debug.contains("object_count"));
    }
}
