//! Cross-reference persistence for folio.
//!
//! Turns an [`ObjectRegistry`](folio_registry::ObjectRegistry) into bytes
//! and back.
//!
//! # Architecture
//!
//! - **syntax**: payload serializer and the tolerant parser
//! - **xref**: fixed-width cross-reference sections
//! - **trailer**: typed view of the trailer dictionary
//! - **FileReader**: loads a store, follows the `/Prev` chain, rebuilds the
//!   table by scanning when the chain is unusable, and materializes objects
//!   on demand for the registry
//! - **DocumentWriter**: standard, incremental and linearized layouts

pub mod error;
pub mod reader;
pub mod syntax;
pub mod trailer;
pub mod writer;
pub mod xref;

pub use error::{XrefError, XrefResult};
pub use reader::{FileReader, LoadedStore};
pub use syntax::{encode_payload, write_indirect, write_payload, Parser, MAX_NESTING};
pub use trailer::Trailer;
pub use writer::{BaseStore, DocumentWriter, SaveMode, WriteOptions, WriteOutput};
pub use xref::{XrefSection, ENTRY_LEN, MAX_OFFSET};

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use folio_registry::{ObjectRegistry, ReusePolicy};
    use folio_types::{Dictionary, ObjectRef, Payload, Stream};

    fn reopen(bytes: Vec<u8>) -> (Rc<FileReader>, LoadedStore, ObjectRegistry) {
        let reader = Rc::new(FileReader::from_bytes(bytes).unwrap());
        let store = reader.load().unwrap();
        let registry = ObjectRegistry::with_reader(
            Box::new(Rc::clone(&reader)),
            store.table.clone(),
            ReusePolicy::default(),
        );
        (reader, store, registry)
    }

    fn sample_registry() -> (ObjectRegistry, Trailer) {
        let mut registry = ObjectRegistry::default();
        let content = registry.allocate(Payload::Stream(Stream::new(
            Dictionary::new(),
            b"BT /F1 12 Tf (Hi) Tj ET".to_vec(),
        )));
        let catalog = registry.allocate(Payload::Dictionary(
            Dictionary::new()
                .with("Type", Payload::name("Catalog"))
                .with("Contents", content.object_ref()),
        ));
        let trailer = Trailer {
            root: Some(catalog.object_ref()),
            ..Trailer::default()
        };
        (registry, trailer)
    }

    #[test]
    fn standard_write_then_read() {
        let (registry, trailer) = sample_registry();
        let out = DocumentWriter::new(&registry, WriteOptions::default())
            .write(SaveMode::Standard, &trailer, None, |_| None)
            .unwrap();

        let (_reader, store, reopened) = reopen(out.bytes);
        assert_eq!(store.trailer.root, Some(ObjectRef::new(2, 0)));
        assert_eq!(store.trailer.size, 3);
        assert_eq!(reopened.high_water(), 2);
        for number in 1..=2 {
            assert_eq!(
                reopened.get(number).unwrap().payload_cloned(),
                registry.get(number).unwrap().payload_cloned()
            );
        }
    }

    #[test]
    fn incremental_chain_newest_wins() {
        let (registry, trailer) = sample_registry();
        let first = DocumentWriter::new(&registry, WriteOptions::default())
            .write(SaveMode::Standard, &trailer, None, |_| None)
            .unwrap();

        let (reader, store, mut reopened) = reopen(first.bytes.clone());
        reopened.update(1, Payload::Integer(99)).unwrap();
        reopened.allocate(Payload::name("Fresh"));
        let second = DocumentWriter::new(&reopened, WriteOptions::default())
            .write(
                SaveMode::Incremental,
                &store.trailer,
                Some(BaseStore {
                    bytes: reader.bytes(),
                    startxref: store.startxref.unwrap(),
                }),
                |_| None,
            )
            .unwrap();
        assert!(second.bytes.starts_with(&first.bytes));
        assert_eq!(second.trailer.prev, Some(first.startxref));

        let (_reader, store, latest) = reopen(second.bytes);
        assert_eq!(store.sections, 2);
        assert_eq!(latest.get(1).unwrap().payload_cloned(), Some(Payload::Integer(99)));
        assert_eq!(latest.get(3).unwrap().payload_cloned(), Some(Payload::name("Fresh")));
        assert!(latest.get(2).unwrap().is_in_use());
    }

    #[test]
    fn incremental_free_shadows_older_entry() {
        let (registry, trailer) = sample_registry();
        let first = DocumentWriter::new(&registry, WriteOptions::default())
            .write(SaveMode::Standard, &trailer, None, |_| None)
            .unwrap();

        let (reader, store, mut reopened) = reopen(first.bytes);
        reopened.remove(1).unwrap();
        let second = DocumentWriter::new(&reopened, WriteOptions::default())
            .write(
                SaveMode::Incremental,
                &store.trailer,
                Some(BaseStore {
                    bytes: reader.bytes(),
                    startxref: store.startxref.unwrap(),
                }),
                |_| None,
            )
            .unwrap();

        let (_reader, _store, latest) = reopen(second.bytes);
        assert!(!latest.get(1).unwrap().is_in_use());
        assert_eq!(latest.get(1).unwrap().generation(), folio_types::UNREUSABLE_GENERATION);
    }

    #[test]
    fn corrupt_object_degrades_to_free() {
        let (registry, trailer) = sample_registry();
        let out = DocumentWriter::new(&registry, WriteOptions::default())
            .write(SaveMode::Standard, &trailer, None, |_| None)
            .unwrap();
        let mut bytes = out.bytes;
        let at = out.section.get(1).unwrap().offset as usize;
        // Renumber the header in place so the entry no longer matches.
        bytes[at] = b'7';

        let (_reader, _store, reopened) = reopen(bytes);
        assert!(!reopened.get(1).unwrap().is_in_use());
        assert!(reopened.get(2).unwrap().is_in_use());
    }

    #[test]
    fn deeply_nested_object_degrades_to_free() {
        let bodies = [
            format!("{}{}", "[".repeat(200_000), "]".repeat(200_000)),
            "<</Type /Catalog>>".to_string(),
        ];
        let mut bytes = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::new();
        for (index, body) in bodies.iter().enumerate() {
            offsets.push(bytes.len());
            bytes.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
        }
        let xref_at = bytes.len();
        bytes.extend_from_slice(b"xref\n0 3\n0000000000 65535 f \n");
        for offset in &offsets {
            bytes.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        bytes.extend_from_slice(
            format!("trailer\n<</Size 3 /Root 2 0 R>>\nstartxref\n{xref_at}\n%EOF\n").as_bytes(),
        );

        let (_reader, _store, reopened) = reopen(bytes);
        assert!(!reopened.get(1).unwrap().is_in_use());
        assert!(reopened.get(2).unwrap().is_in_use());
    }

    #[test]
    fn standard_save_survives_disk_round_trip() {
        let (registry, trailer) = sample_registry();
        let out = DocumentWriter::new(&registry, WriteOptions::default())
            .write(SaveMode::Standard, &trailer, None, |_| None)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.pdf");
        std::fs::write(&path, &out.bytes).unwrap();

        let reader = Rc::new(FileReader::open(&path).unwrap());
        let store = reader.load().unwrap();
        assert_eq!(store.startxref, Some(out.startxref));
        let reopened = ObjectRegistry::with_reader(
            Box::new(Rc::clone(&reader)),
            store.table.clone(),
            ReusePolicy::default(),
        );
        for number in 1..=2 {
            assert_eq!(
                reopened.get(number).unwrap().payload_cloned(),
                registry.get(number).unwrap().payload_cloned()
            );
        }
    }

    #[test]
    fn linearized_output_reopens() {
        let (registry, trailer) = sample_registry();
        let out = DocumentWriter::new(&registry, WriteOptions::default())
            .write(SaveMode::Linearized, &trailer, None, |_| None)
            .unwrap();
        let (_reader, store, reopened) = reopen(out.bytes);
        assert_eq!(store.trailer.size, 4);
        let params = reopened.get(3).unwrap().payload_cloned().unwrap();
        assert!(params.as_dictionary().unwrap().contains_key("Linearized"));
        assert_eq!(
            reopened.get(1).unwrap().payload_cloned(),
            registry.get(1).unwrap().payload_cloned()
        );
    }
}
