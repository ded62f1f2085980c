use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use folio_registry::{IdentityEntry, ObjectHandle, ObjectRegistry, Origin, ReusePolicy};
use folio_types::{
    FormatVersion, ObjectRef, Payload, RevisionId, MAX_OBJECT_NUMBER, UNREUSABLE_GENERATION,
};

use crate::error::{XrefError, XrefResult};
use crate::syntax::{write_dictionary, write_indirect, Parser};
use crate::trailer::Trailer;
use crate::xref::XrefSection;

/// How a save lays out the output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveMode {
    /// Rewrite every live object in number order with one section.
    #[default]
    Standard,
    /// Copy the original bytes and append modified objects plus a section
    /// chained to the previous one.
    Incremental,
    /// Full rewrite with the first page's objects up front.
    Linearized,
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Incremental => write!(f, "incremental"),
            Self::Linearized => write!(f, "linearized"),
        }
    }
}

impl FromStr for SaveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "incremental" => Ok(Self::Incremental),
            "linearized" => Ok(Self::Linearized),
            other => Err(format!(
                "unknown save mode '{other}' (expected standard, incremental or linearized)"
            )),
        }
    }
}

/// Writer settings that do not vary per save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOptions {
    pub version: FormatVersion,
    /// Decides whether free entries are linked through object 0.
    pub policy: ReusePolicy,
    /// Re-parse every written object header after writing.
    pub verify: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            version: FormatVersion::default(),
            policy: ReusePolicy::default(),
            verify: true,
        }
    }
}

/// The original store an incremental save appends to.
#[derive(Clone, Copy, Debug)]
pub struct BaseStore<'a> {
    pub bytes: &'a [u8],
    /// Offset of the newest cross-reference section in `bytes`.
    pub startxref: u64,
}

/// Result of one write.
#[derive(Clone, Debug)]
pub struct WriteOutput {
    pub bytes: Vec<u8>,
    /// The section written by this save.
    pub section: XrefSection,
    pub startxref: u64,
    /// The trailer as written, including `/Size`, `/Prev` and `/ID`.
    pub trailer: Trailer,
    pub objects_written: usize,
}

/// Serializes a registry.
pub struct DocumentWriter<'a> {
    registry: &'a ObjectRegistry,
    options: WriteOptions,
}

impl<'a> DocumentWriter<'a> {
    pub fn new(registry: &'a ObjectRegistry, options: WriteOptions) -> Self {
        Self { registry, options }
    }

    /// Write the registry in `mode`.
    ///
    /// `stamp` receives the length of the object data and returns the
    /// revision id for the trailer, or `None` to keep the one in `trailer`.
    /// Incremental mode requires `base`.
    pub fn write<F>(
        &self,
        mode: SaveMode,
        trailer: &Trailer,
        base: Option<BaseStore<'_>>,
        stamp: F,
    ) -> XrefResult<WriteOutput>
    where
        F: FnOnce(u64) -> Option<RevisionId>,
    {
        // Linearized saves spend one number on the parameter dictionary.
        let highest = match mode {
            SaveMode::Linearized => self.registry.high_water().saturating_add(1),
            _ => self.registry.high_water(),
        };
        if highest > MAX_OBJECT_NUMBER {
            return Err(XrefError::ObjectLimit {
                number: highest,
                limit: MAX_OBJECT_NUMBER,
            });
        }

        let output = match mode {
            SaveMode::Standard => self.write_standard(trailer, stamp)?,
            SaveMode::Incremental => {
                let base = base.ok_or(XrefError::MissingBase)?;
                self.write_incremental(trailer, base, stamp)?
            }
            SaveMode::Linearized => self.write_linearized(trailer, stamp)?,
        };
        if self.options.verify {
            verify(&output.bytes, &output.section)?;
        }
        debug!(
            mode = %mode,
            bytes = output.bytes.len(),
            objects = output.objects_written,
            entries = output.section.len(),
            startxref = output.startxref,
            "wrote document"
        );
        Ok(output)
    }

    fn write_standard<F>(&self, trailer: &Trailer, stamp: F) -> XrefResult<WriteOutput>
    where
        F: FnOnce(u64) -> Option<RevisionId>,
    {
        let high_water = self.registry.high_water();
        let stale = self.stale_params()?;
        let mut out = header(self.options.version);
        let mut section = XrefSection::new();
        let mut free = Vec::new();
        let mut written = 0;

        for number in self.registry.known_numbers() {
            let handle = self.registry.get(number)?;
            if self.emit(&mut out, &mut section, &mut free, &handle, stale)? {
                written += 1;
            }
        }
        link_free(&mut section, free, self.options.policy);

        let mut trailer = trailer.clone();
        trailer.size = high_water + 1;
        trailer.prev = None;
        self.finish(out, section, trailer, stamp, written)
    }

    fn write_incremental<F>(
        &self,
        trailer: &Trailer,
        base: BaseStore<'_>,
        stamp: F,
    ) -> XrefResult<WriteOutput>
    where
        F: FnOnce(u64) -> Option<RevisionId>,
    {
        let mut out = base.bytes.to_vec();
        if !matches!(out.last(), Some(b'\n' | b'\r')) {
            out.push(b'\n');
        }
        let mut section = XrefSection::new();
        let mut free = Vec::new();
        let mut written = 0;

        for handle in self.registry.modified_handles() {
            if handle.is_in_use() {
                self.emit_object(&mut out, &mut section, handle);
                written += 1;
            } else {
                free.push(*handle.identity());
            }
        }
        link_free(&mut section, free, self.options.policy);

        let mut trailer = trailer.clone();
        trailer.size = trailer.size.max(self.registry.high_water() + 1);
        trailer.prev = Some(base.startxref);
        self.finish(out, section, trailer, stamp, written)
    }

    fn write_linearized<F>(&self, trailer: &Trailer, stamp: F) -> XrefResult<WriteOutput>
    where
        F: FnOnce(u64) -> Option<RevisionId>,
    {
        let params_number = self.registry.high_water() + 1;
        let stale = self.stale_params()?;
        let plan = self.plan_first_page(trailer.root)?;

        let mut out = header(self.options.version);
        let mut section = XrefSection::new();
        let mut free = Vec::new();
        let mut written = 1;

        let params_at = out.len();
        let placeholder = plan.params(params_number, 0, 0, 0);
        out.extend_from_slice(placeholder.as_bytes());
        section.insert(IdentityEntry::in_use(params_number, 0, params_at as u64));

        let leading: BTreeSet<u32> = plan.leading.iter().copied().collect();
        for &number in &plan.leading {
            let handle = self.registry.get(number)?;
            if self.emit(&mut out, &mut section, &mut free, &handle, stale)? {
                written += 1;
            }
        }
        let end_of_first_page = out.len() as u64;

        for number in self.registry.known_numbers() {
            if leading.contains(&number) {
                continue;
            }
            let handle = self.registry.get(number)?;
            if self.emit(&mut out, &mut section, &mut free, &handle, stale)? {
                written += 1;
            }
        }
        link_free(&mut section, free, self.options.policy);

        let mut trailer = trailer.clone();
        trailer.size = params_number + 1;
        trailer.prev = None;
        let mut output = self.finish(out, section, trailer, stamp, written)?;

        // Same width as the placeholder: every patched field is ten digits.
        let params = plan.params(
            params_number,
            output.bytes.len() as u64,
            end_of_first_page,
            output.startxref,
        );
        debug_assert_eq!(params.len(), placeholder.len());
        output.bytes[params_at..params_at + params.len()].copy_from_slice(params.as_bytes());
        debug!(
            first_page = plan.first_page,
            pages = plan.page_count,
            leading = plan.leading.len(),
            end_of_first_page,
            "linearized layout"
        );
        Ok(output)
    }

    /// The parameter dictionary a previous linearized save put first in
    /// the store, if the registry still holds it unmodified.
    ///
    /// A full rewrite drops it and produces a fresh one or none at all.
    fn stale_params(&self) -> XrefResult<Option<u32>> {
        let first = self
            .registry
            .table()
            .iter()
            .filter(|entry| entry.number != 0 && entry.is_in_use())
            .min_by_key(|entry| entry.offset);
        let Some(first) = first else {
            return Ok(None);
        };
        let handle = self.registry.get(first.number)?;
        let is_params = handle.origin() == Origin::Original
            && handle
                .payload()
                .as_ref()
                .and_then(Payload::as_dictionary)
                .is_some_and(|dict| dict.contains_key("Linearized"));
        Ok(is_params.then_some(first.number))
    }

    /// Emit an in-use handle, or queue a free one. Returns whether an
    /// object was written.
    fn emit(
        &self,
        out: &mut Vec<u8>,
        section: &mut XrefSection,
        free: &mut Vec<IdentityEntry>,
        handle: &ObjectHandle,
        stale: Option<u32>,
    ) -> XrefResult<bool> {
        if !handle.is_in_use() {
            free.push(*handle.identity());
            return Ok(false);
        }
        if stale == Some(handle.number()) {
            debug!(number = handle.number(), "dropped stale linearization parameters");
            free.push(IdentityEntry::free(handle.number(), UNREUSABLE_GENERATION));
            return Ok(false);
        }
        self.emit_object(out, section, handle);
        Ok(true)
    }

    fn emit_object(&self, out: &mut Vec<u8>, section: &mut XrefSection, handle: &ObjectHandle) {
        let offset = out.len() as u64;
        let payload = handle.payload();
        write_indirect(out, handle.object_ref(), payload.as_ref().unwrap_or(&Payload::Null));
        section.insert(IdentityEntry::in_use(
            handle.number(),
            handle.generation(),
            offset,
        ));
    }

    fn finish<F>(
        &self,
        mut out: Vec<u8>,
        section: XrefSection,
        mut trailer: Trailer,
        stamp: F,
        objects_written: usize,
    ) -> XrefResult<WriteOutput>
    where
        F: FnOnce(u64) -> Option<RevisionId>,
    {
        if let Some(id) = stamp(out.len() as u64) {
            trailer.id = Some(id);
        }
        let startxref = out.len() as u64;
        section.write(&mut out)?;
        out.extend_from_slice(b"trailer\n");
        write_dictionary(&mut out, &trailer.to_dictionary());
        out.extend_from_slice(format!("\nstartxref\n{startxref}\n%EOF\n").as_bytes());
        Ok(WriteOutput {
            bytes: out,
            section,
            startxref,
            trailer,
            objects_written,
        })
    }

    /// Catalog, the page-tree path down to the first page, then everything
    /// the first page references except its `/Parent`.
    fn plan_first_page(&self, root: Option<ObjectRef>) -> XrefResult<FirstPagePlan> {
        let mut plan = FirstPagePlan::default();
        let mut seen = BTreeSet::new();
        let Some(root) = root else {
            return Ok(plan);
        };
        let Some(catalog) = self.registry.lookup(root)? else {
            return Ok(plan);
        };
        seen.insert(root.number);
        plan.leading.push(root.number);

        let mut node = catalog
            .payload_cloned()
            .and_then(|p| p.as_dictionary().and_then(|d| d.get_reference("Pages")));
        let mut is_tree_root = true;
        while let Some(reference) = node.take() {
            let Some(handle) = self.registry.lookup(reference)? else {
                break;
            };
            if !seen.insert(reference.number) {
                break;
            }
            plan.leading.push(reference.number);
            let payload = handle.payload_cloned().unwrap_or(Payload::Null);
            let Some(dict) = payload.as_dictionary() else {
                break;
            };
            if is_tree_root {
                plan.page_count = dict
                    .get("Count")
                    .and_then(Payload::as_integer)
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(0);
                is_tree_root = false;
            }
            match dict.get("Kids").and_then(Payload::as_array) {
                Some(kids) => {
                    node = kids.first().and_then(Payload::as_reference);
                }
                None => plan.first_page = reference.number,
            }
        }

        if plan.first_page == 0 {
            return Ok(plan);
        }
        let mut queue: VecDeque<ObjectRef> = self
            .registry
            .get(plan.first_page)?
            .payload_cloned()
            .map(|p| p.references_except(&["Parent"]))
            .unwrap_or_default()
            .into();
        while let Some(reference) = queue.pop_front() {
            if seen.contains(&reference.number) {
                continue;
            }
            let Some(handle) = self.registry.lookup(reference)? else {
                continue;
            };
            seen.insert(reference.number);
            plan.leading.push(reference.number);
            if let Some(payload) = handle.payload_cloned() {
                queue.extend(payload.references_except(&["Parent"]));
            }
        }
        Ok(plan)
    }
}

#[derive(Debug, Default)]
struct FirstPagePlan {
    leading: Vec<u32>,
    first_page: u32,
    page_count: u32,
}

impl FirstPagePlan {
    /// The linearization parameter object. Length-dependent fields are
    /// zero-padded so the patched object keeps its size.
    fn params(&self, number: u32, length: u64, end_of_first_page: u64, xref_at: u64) -> String {
        format!(
            "{number} 0 obj\n<</Linearized 1 /L {length:010} /O {} /E {end_of_first_page:010} /N {} /T {xref_at:010}>>\nendobj\n",
            self.first_page, self.page_count
        )
    }
}

fn header(version: FormatVersion) -> Vec<u8> {
    let mut out = format!("%PDF-{version}\n").into_bytes();
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
    out
}

/// Add entry 0 and the free entries. Under the legacy policy each free
/// entry's offset field links to the next free number, ending at 0.
fn link_free(section: &mut XrefSection, mut free: Vec<IdentityEntry>, policy: ReusePolicy) {
    free.sort_by_key(|entry| entry.number);
    let mut head = IdentityEntry::reserved();
    match policy {
        ReusePolicy::NeverRecycle => {
            section.insert(head);
            for entry in free {
                section.insert(IdentityEntry::free(entry.number, entry.generation));
            }
        }
        ReusePolicy::LegacyFreeList => {
            head.offset = free.first().map_or(0, |entry| u64::from(entry.number));
            section.insert(head);
            for (i, entry) in free.iter().enumerate() {
                let mut linked = IdentityEntry::free(entry.number, entry.generation);
                linked.offset = free.get(i + 1).map_or(0, |next| u64::from(next.number));
                section.insert(linked);
            }
        }
    }
}

/// Check that every in-use entry points at its own object header.
fn verify(bytes: &[u8], section: &XrefSection) -> XrefResult<()> {
    for entry in section.iter().filter(|entry| entry.is_in_use()) {
        let found = usize::try_from(entry.offset)
            .ok()
            .and_then(|at| Parser::at(bytes, at).try_object_header());
        if found != Some(entry.object_ref()) {
            return Err(XrefError::XrefInconsistent {
                number: entry.number,
                offset: entry.offset,
            });
        }
    }
    Ok(())
}
