use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use folio_registry::{
    BackingReader, IdentityEntry, IdentityTable, RegistryResult, TrailerSnapshot,
};
use folio_types::{Dictionary, FormatVersion, ObjectRef, Payload};

use crate::error::{XrefError, XrefResult};
use crate::syntax::{rfind, Parser};
use crate::trailer::Trailer;
use crate::xref::XrefSection;

/// How far from the end of the store `startxref` is searched for.
const TAIL_WINDOW: usize = 4096;

/// Everything learned from a store's cross-reference data.
#[derive(Clone, Debug)]
pub struct LoadedStore {
    pub version: FormatVersion,
    /// Newest trailer.
    pub trailer: Trailer,
    /// One entry per object number, newest section winning.
    pub table: IdentityTable,
    /// Offset of the newest cross-reference section, if one was found.
    pub startxref: Option<u64>,
    /// Number of sections followed through the `/Prev` chain.
    pub sections: usize,
    /// The table was reconstructed by scanning for object headers.
    pub rebuilt: bool,
}

/// Reads a complete store held in memory.
///
/// The whole store is loaded up front; the original file is not touched
/// again until the session replaces it.
pub struct FileReader {
    data: Vec<u8>,
    version: FormatVersion,
}

impl FileReader {
    /// Open from raw bytes. Only the header is validated here.
    pub fn from_bytes(data: Vec<u8>) -> XrefResult<Self> {
        let version = parse_header(&data)?;
        Ok(Self { data, version })
    }

    /// Open from disk.
    pub fn open(path: &Path) -> XrefResult<Self> {
        let data = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = data.len(), "read store");
        Self::from_bytes(data)
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// The raw store bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read the cross-reference chain and the newest trailer.
    ///
    /// Falls back to a scan for object headers when `startxref` is missing
    /// or any section in the chain is unreadable. Encrypted stores are
    /// refused.
    pub fn load(&self) -> XrefResult<LoadedStore> {
        let startxref = self.find_startxref();
        let (trailer, table, sections, rebuilt) = match startxref {
            Some(start) => match self.read_sections(start) {
                Ok((trailer, table, sections)) => (trailer, table, sections, false),
                Err(e) => {
                    warn!(startxref = start, error = %e, "cross-reference unreadable; rebuilding");
                    let (trailer, table) = self.rebuild()?;
                    (trailer, table, 0, true)
                }
            },
            None => {
                warn!("no startxref found; rebuilding");
                let (trailer, table) = self.rebuild()?;
                (trailer, table, 0, true)
            }
        };

        let trailer = Trailer::from_dictionary(&trailer);
        if trailer.is_encrypted() {
            return Err(XrefError::EncryptedUnsupported);
        }
        debug!(
            version = %self.version,
            objects = table.len(),
            live = table.live_count(),
            sections,
            rebuilt,
            "loaded cross-reference"
        );
        Ok(LoadedStore {
            version: self.version,
            trailer,
            table,
            startxref: if rebuilt { None } else { startxref },
            sections,
            rebuilt,
        })
    }

    /// Parse the object whose header starts at `offset` and check that it
    /// is `expected`.
    pub fn read_object_at(&self, offset: u64, expected: ObjectRef) -> XrefResult<Payload> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|start| *start < self.data.len())
            .ok_or_else(|| XrefError::CorruptEntry {
                offset,
                reason: "offset beyond end of store".into(),
            })?;
        let (found, payload) = Parser::at(&self.data, start).parse_indirect()?;
        if found != expected {
            return Err(XrefError::CorruptEntry {
                offset,
                reason: format!("expected object {expected}, found {found}"),
            });
        }
        Ok(payload)
    }

    fn find_startxref(&self) -> Option<u64> {
        let tail = self.data.len().saturating_sub(TAIL_WINDOW);
        let at = tail + rfind(&self.data[tail..], b"startxref")?;
        Parser::at(&self.data, at + b"startxref".len())
            .read_unsigned()
            .ok()
    }

    fn read_sections(&self, start: u64) -> XrefResult<(Dictionary, IdentityTable, usize)> {
        let mut table = IdentityTable::default();
        let mut newest: Option<Dictionary> = None;
        let mut visited = HashSet::new();
        let mut next = Some(start);

        while let Some(offset) = next {
            if !visited.insert(offset) {
                warn!(offset, "cycle in /Prev chain; stopping");
                break;
            }
            let at = usize::try_from(offset)
                .ok()
                .filter(|at| *at < self.data.len())
                .ok_or_else(|| XrefError::CorruptEntry {
                    offset,
                    reason: "section offset beyond end of store".into(),
                })?;
            let mut parser = Parser::at(&self.data, at);
            let section = XrefSection::parse(&mut parser)?;
            parser.expect_keyword(b"trailer")?;
            let dict = parser.parse_dictionary()?;

            for entry in section.iter() {
                table.insert_if_absent(*entry);
            }
            next = dict
                .get("Prev")
                .and_then(Payload::as_integer)
                .and_then(|prev| u64::try_from(prev).ok());
            debug!(offset, entries = section.len(), "read cross-reference section");
            newest.get_or_insert(dict);
        }

        table.insert_if_absent(IdentityEntry::reserved());
        Ok((newest.unwrap_or_default(), table, visited.len()))
    }

    /// Reconstruct the table from `N G obj` headers at line starts. Later
    /// occurrences of a number win, as they would after incremental saves.
    fn rebuild(&self) -> XrefResult<(Dictionary, IdentityTable)> {
        let data = &self.data;
        let mut table = IdentityTable::new();
        let mut pos = 0;
        while pos < data.len() {
            let line_start = pos == 0 || matches!(data[pos - 1], b'\n' | b'\r');
            if line_start && data[pos].is_ascii_digit() {
                let mut parser = Parser::at(data, pos);
                if let Some(found) = parser.try_object_header() {
                    table.insert(IdentityEntry::in_use(
                        found.number,
                        found.generation,
                        pos as u64,
                    ));
                    pos = parser.position();
                    continue;
                }
            }
            pos += 1;
        }
        if table.live_count() == 0 {
            return Err(XrefError::CorruptEntry {
                offset: 0,
                reason: "no objects found while rebuilding".into(),
            });
        }

        let mut trailer = rfind(data, b"trailer")
            .and_then(|at| {
                Parser::at(data, at + b"trailer".len())
                    .parse_dictionary()
                    .ok()
            })
            .unwrap_or_default();
        trailer.remove("Prev");
        trailer.insert("Size", i64::from(table.max_number()) + 1);
        if trailer.get_reference("Root").is_none() {
            if let Some(root) = self.find_catalog(&table) {
                trailer.insert("Root", root);
            }
        }
        warn!(objects = table.live_count(), "rebuilt cross-reference table");
        Ok((trailer, table))
    }

    fn find_catalog(&self, table: &IdentityTable) -> Option<ObjectRef> {
        table.iter().filter(|entry| entry.is_in_use()).find_map(|entry| {
            let payload = self.read_object_at(entry.offset, entry.object_ref()).ok()?;
            let is_catalog = payload
                .as_dictionary()
                .and_then(|dict| dict.get("Type"))
                .and_then(Payload::as_name)
                == Some("Catalog");
            is_catalog.then(|| entry.object_ref())
        })
    }
}

fn parse_header(data: &[u8]) -> XrefResult<FormatVersion> {
    const MAGIC: &[u8] = b"%PDF-";
    if !data.starts_with(MAGIC) {
        let shown = String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned();
        return Err(XrefError::InvalidHeader(format!("expected %PDF-, found {shown:?}")));
    }
    let rest = &data[MAGIC.len()..];
    let end = rest
        .iter()
        .position(|b| crate::syntax::is_whitespace(*b))
        .unwrap_or(rest.len());
    let text = String::from_utf8_lossy(&rest[..end]);
    let version: FormatVersion = text
        .parse()
        .map_err(|_| XrefError::InvalidHeader(format!("bad version {text:?}")))?;
    if !(1..=2).contains(&version.major) {
        return Err(XrefError::UnsupportedVersion(version));
    }
    Ok(version)
}

impl BackingReader for FileReader {
    fn read_trailer(&self) -> RegistryResult<TrailerSnapshot> {
        let store = self.load()?;
        Ok(TrailerSnapshot {
            version: store.version,
            trailer: store.trailer.to_dictionary(),
            table: store.table,
        })
    }

    fn materialize(&self, entry: &IdentityEntry) -> RegistryResult<Payload> {
        Ok(self.read_object_at(entry.offset, entry.object_ref())?)
    }
}

impl std::fmt::Debug for FileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("version", &self.version)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-written store with correct offsets.
    fn store(objects: &[(u32, &str)], trailer_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (number, body) in objects {
            offsets.push((*number, out.len()));
            out.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
        }
        let max = objects.iter().map(|(n, _)| *n).max().unwrap_or(0);
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", max + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for n in 1..=max {
            match offsets.iter().find(|(m, _)| *m == n) {
                Some((_, off)) => out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes()),
                None => out.extend_from_slice(b"0000000000 00001 f \n"),
            }
        }
        out.extend_from_slice(
            format!("trailer\n<</Size {} /Root 1 0 R{trailer_extra}>>\nstartxref\n{xref_at}\n%EOF\n", max + 1)
                .as_bytes(),
        );
        out
    }

    fn simple() -> Vec<u8> {
        store(
            &[
                (1, "<</Type /Catalog /Pages 2 0 R>>"),
                (2, "<</Type /Pages /Kids [] /Count 0>>"),
                (4, "(hello)"),
            ],
            "",
        )
    }

    #[test]
    fn rejects_bad_header() {
        let err = FileReader::from_bytes(b"GIF89a".to_vec()).unwrap_err();
        assert!(matches!(err, XrefError::InvalidHeader(_)));
        let err = FileReader::from_bytes(b"%PDF-x.y\n".to_vec()).unwrap_err();
        assert!(matches!(err, XrefError::InvalidHeader(_)));
        let err = FileReader::from_bytes(b"%PDF-9.0\n".to_vec()).unwrap_err();
        assert!(matches!(err, XrefError::UnsupportedVersion(_)));
    }

    #[test]
    fn loads_table_and_trailer() {
        let reader = FileReader::from_bytes(simple()).unwrap();
        assert_eq!(reader.version(), FormatVersion::V1_4);
        let store = reader.load().unwrap();
        assert!(!store.rebuilt);
        assert_eq!(store.sections, 1);
        assert_eq!(store.trailer.size, 5);
        assert_eq!(store.trailer.root, Some(ObjectRef::new(1, 0)));
        assert_eq!(store.table.live_count(), 3);
        assert!(!store.table.get(3).unwrap().is_in_use());
    }

    #[test]
    fn materializes_objects() {
        let reader = FileReader::from_bytes(simple()).unwrap();
        let store = reader.load().unwrap();
        let entry = *store.table.get(4).unwrap();
        let payload = reader.materialize(&entry).unwrap();
        assert_eq!(payload, Payload::string(b"hello".to_vec()));
    }

    #[test]
    fn trailer_snapshot_carries_version_and_table() {
        let reader = FileReader::from_bytes(simple()).unwrap();
        let snapshot = reader.read_trailer().unwrap();
        assert_eq!(snapshot.version, FormatVersion::V1_4);
        assert_eq!(snapshot.trailer.get_reference("Root"), Some(ObjectRef::new(1, 0)));
        assert_eq!(snapshot.trailer.get("Size").and_then(Payload::as_integer), Some(5));
        assert_eq!(snapshot.table.live_count(), 3);
        assert!(snapshot.table.get(4).unwrap().is_in_use());
        assert!(!snapshot.table.get(3).unwrap().is_in_use());
    }

    #[test]
    fn trailer_snapshot_fails_on_encrypted_store() {
        let data = store(&[(1, "<</Type /Catalog>>")], " /Encrypt <</Filter /Standard>>");
        let reader = FileReader::from_bytes(data).unwrap();
        assert!(reader.read_trailer().is_err());
    }

    #[test]
    fn opens_store_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simple.pdf");
        std::fs::write(&path, simple()).unwrap();

        let reader = FileReader::open(&path).unwrap();
        assert_eq!(reader.len(), simple().len());
        let store = reader.load().unwrap();
        let entry = *store.table.get(4).unwrap();
        assert_eq!(
            reader.materialize(&entry).unwrap(),
            Payload::string(b"hello".to_vec())
        );
        assert!(FileReader::open(&dir.path().join("missing.pdf")).is_err());
    }

    #[test]
    fn deeply_nested_object_fails_without_overflow() {
        let deep = format!("{}{}", "[".repeat(100_000), "]".repeat(100_000));
        let data = store(&[(1, "<</Type /Catalog>>"), (2, deep.as_str())], "");
        let reader = FileReader::from_bytes(data).unwrap();
        let store = reader.load().unwrap();
        let entry = *store.table.get(2).unwrap();
        assert!(matches!(
            reader.read_object_at(entry.offset, entry.object_ref()),
            Err(XrefError::Syntax { .. })
        ));
    }

    #[test]
    fn mismatched_header_is_corrupt() {
        let reader = FileReader::from_bytes(simple()).unwrap();
        let store = reader.load().unwrap();
        let entry = *store.table.get(4).unwrap();
        let err = reader
            .read_object_at(entry.offset, ObjectRef::new(4, 1))
            .unwrap_err();
        assert!(matches!(err, XrefError::CorruptEntry { .. }));
        let err = reader.read_object_at(1 << 40, entry.object_ref()).unwrap_err();
        assert!(matches!(err, XrefError::CorruptEntry { .. }));
    }

    #[test]
    fn encrypted_store_is_refused() {
        let data = store(&[(1, "<</Type /Catalog>>")], " /Encrypt <</Filter /Standard>>");
        let reader = FileReader::from_bytes(data).unwrap();
        assert!(matches!(reader.load(), Err(XrefError::EncryptedUnsupported)));
    }

    #[test]
    fn missing_startxref_triggers_rebuild() {
        let mut data = simple();
        let cut = rfind(&data, b"startxref").unwrap();
        data.truncate(cut);
        let reader = FileReader::from_bytes(data).unwrap();
        let store = reader.load().unwrap();
        assert!(store.rebuilt);
        assert_eq!(store.startxref, None);
        assert_eq!(store.table.live_count(), 3);
        assert_eq!(store.trailer.root, Some(ObjectRef::new(1, 0)));
        assert_eq!(store.trailer.size, 5);
    }

    #[test]
    fn rebuild_finds_catalog_without_trailer() {
        let data = b"%PDF-1.7\n1 0 obj\n(x)\nendobj\n2 0 obj\n<</Type /Catalog>>\nendobj\n".to_vec();
        let reader = FileReader::from_bytes(data).unwrap();
        let store = reader.load().unwrap();
        assert!(store.rebuilt);
        assert_eq!(store.trailer.root, Some(ObjectRef::new(2, 0)));
    }

    #[test]
    fn bad_startxref_triggers_rebuild() {
        let mut data = simple();
        let at = rfind(&data, b"startxref").unwrap();
        data.truncate(at);
        data.extend_from_slice(b"startxref\n3\n%EOF\n");
        let store = FileReader::from_bytes(data).unwrap().load().unwrap();
        assert!(store.rebuilt);
    }

    #[test]
    fn empty_store_cannot_be_rebuilt() {
        let reader = FileReader::from_bytes(b"%PDF-1.7\n%EOF\n".to_vec()).unwrap();
        assert!(matches!(reader.load(), Err(XrefError::CorruptEntry { .. })));
    }

    #[test]
    fn prev_cycle_terminates() {
        let mut data = simple();
        let xref_at = rfind(&data, b"xref\n0").unwrap();
        // Point /Prev back at the same section.
        let trailer_at = rfind(&data, b"/Root").unwrap();
        let patch = format!("/Prev {xref_at} ");
        data.splice(trailer_at..trailer_at, patch.bytes());
        let startxref_at = rfind(&data, b"startxref").unwrap();
        data.truncate(startxref_at);
        data.extend_from_slice(format!("startxref\n{xref_at}\n%EOF\n").as_bytes());

        let store = FileReader::from_bytes(data).unwrap().load().unwrap();
        assert!(!store.rebuilt);
        assert_eq!(store.sections, 1);
    }
}
