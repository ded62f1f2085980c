use std::collections::BTreeMap;

use folio_registry::{IdentityEntry, Usage};

use crate::error::{XrefError, XrefResult};
use crate::syntax::Parser;

/// Bytes per table entry, including the two-byte line ending.
pub const ENTRY_LEN: usize = 20;

/// Largest offset that fits the ten-digit offset field.
pub const MAX_OFFSET: u64 = 9_999_999_999;

/// One cross-reference section: a set of identity entries written as runs
/// of consecutive numbers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XrefSection {
    entries: BTreeMap<u32, IdentityEntry>,
}

impl XrefSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `entry.number`.
    pub fn insert(&mut self, entry: IdentityEntry) {
        self.entries.insert(entry.number, entry);
    }

    pub fn get(&self, number: u32) -> Option<&IdentityEntry> {
        self.entries.get(&number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityEntry> {
        self.entries.values()
    }

    /// Runs of consecutive numbers as `(first, entries)`.
    pub fn subsections(&self) -> Vec<(u32, Vec<&IdentityEntry>)> {
        let mut runs: Vec<(u32, Vec<&IdentityEntry>)> = Vec::new();
        for entry in self.entries.values() {
            match runs.last_mut() {
                Some((first, run)) if *first + run.len() as u32 == entry.number => run.push(entry),
                _ => runs.push((entry.number, vec![entry])),
            }
        }
        runs
    }

    /// Append the `xref` keyword and every subsection to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> XrefResult<()> {
        out.extend_from_slice(b"xref\n");
        for (first, run) in self.subsections() {
            out.extend_from_slice(format!("{} {}\n", first, run.len()).as_bytes());
            for entry in run {
                write_entry(out, entry)?;
            }
        }
        Ok(())
    }

    /// Parse `xref` and its subsections, stopping before `trailer`.
    pub fn parse(parser: &mut Parser<'_>) -> XrefResult<Self> {
        parser.expect_keyword(b"xref").map_err(|_| XrefError::CorruptEntry {
            offset: parser.position() as u64,
            reason: "expected 'xref'".into(),
        })?;

        let mut section = Self::new();
        while !parser.peek_keyword(b"trailer") {
            if parser.is_at_end() {
                return Err(XrefError::CorruptEntry {
                    offset: parser.position() as u64,
                    reason: "cross-reference section without trailer".into(),
                });
            }
            let first = read_u32(parser)?;
            let count = read_u32(parser)?;
            for i in 0..count {
                let number = first.checked_add(i).ok_or_else(|| XrefError::CorruptEntry {
                    offset: parser.position() as u64,
                    reason: "object number overflow".into(),
                })?;
                section.insert(read_entry(parser, number)?);
            }
        }
        Ok(section)
    }
}

impl FromIterator<IdentityEntry> for XrefSection {
    fn from_iter<T: IntoIterator<Item = IdentityEntry>>(iter: T) -> Self {
        let mut section = Self::new();
        for entry in iter {
            section.insert(entry);
        }
        section
    }
}

/// Append one fixed-width entry: `oooooooooo ggggg n \n`.
pub fn write_entry(out: &mut Vec<u8>, entry: &IdentityEntry) -> XrefResult<()> {
    if entry.offset > MAX_OFFSET {
        return Err(XrefError::OffsetOverflow(entry.offset));
    }
    let kind = match entry.usage {
        Usage::InUse => 'n',
        Usage::Free => 'f',
    };
    let line = format!("{:010} {:05} {} \n", entry.offset, entry.generation, kind);
    debug_assert_eq!(line.len(), ENTRY_LEN);
    out.extend_from_slice(line.as_bytes());
    Ok(())
}

fn read_u32(parser: &mut Parser<'_>) -> XrefResult<u32> {
    let offset = parser.position() as u64;
    let value = parser.read_unsigned().map_err(|_| XrefError::CorruptEntry {
        offset,
        reason: "expected a number".into(),
    })?;
    u32::try_from(value).map_err(|_| XrefError::CorruptEntry {
        offset,
        reason: format!("value {value} out of range"),
    })
}

/// Entries are read by token rather than by fixed width, so single-byte
/// line endings written by other producers are accepted too.
fn read_entry(parser: &mut Parser<'_>, number: u32) -> XrefResult<IdentityEntry> {
    let offset_at = parser.position() as u64;
    let offset = parser.read_unsigned().map_err(|_| XrefError::CorruptEntry {
        offset: offset_at,
        reason: format!("entry {number}: bad offset"),
    })?;
    let generation = read_u32(parser)?;
    parser.skip_whitespace();
    match parser.read_token() {
        b"n" => Ok(IdentityEntry::in_use(number, generation, offset)),
        b"f" => Ok(IdentityEntry {
            number,
            generation,
            offset,
            usage: Usage::Free,
        }),
        other => Err(XrefError::CorruptEntry {
            offset: offset_at,
            reason: format!(
                "entry {number}: unknown type '{}'",
                String::from_utf8_lossy(other)
            ),
        }),
    }
}
