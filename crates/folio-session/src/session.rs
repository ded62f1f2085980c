use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use folio_registry::{Importer, ObjectHandle, ObjectRegistry};
use folio_types::{Dictionary, FormatVersion, ObjectRef, Payload, RevisionId};
use folio_xref::{BaseStore, DocumentWriter, FileReader, SaveMode, Trailer};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::revision::{format_date, next_revision, RevisionInputs};

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// New document, nothing saved yet.
    Created,
    /// Opened from an existing store, nothing saved yet.
    Parsed,
    /// At least one save produced a pending replacement.
    Saved,
    /// Terminal.
    Closed,
}

/// Summary of one save.
#[derive(Clone, Debug)]
pub struct SaveReport {
    pub mode: SaveMode,
    pub bytes: u64,
    pub objects_written: usize,
    pub revision: RevisionId,
}

/// Output of the most recent save, kept so an incremental save can append
/// to it.
struct SavedImage {
    bytes: Vec<u8>,
    startxref: u64,
}

/// One document persistence session.
///
/// Saves go to a temporary file next to the target; [`Document::close`]
/// renames it over the target. Until then the original store is not
/// touched, so a failed save can simply be retried.
///
/// Like the registry it owns, a document is `!Send` and `!Sync`.
pub struct Document {
    config: SessionConfig,
    state: SessionState,
    path: Option<PathBuf>,
    version: FormatVersion,
    registry: ObjectRegistry,
    trailer: Trailer,
    original: Option<Rc<FileReader>>,
    original_startxref: Option<u64>,
    last_save: Option<SavedImage>,
    pending: Option<NamedTempFile>,
    saves: u64,
}

impl Document {
    /// Start an empty document.
    pub fn create(config: SessionConfig) -> Self {
        debug!(version = %config.format_version, "created document");
        Self {
            registry: ObjectRegistry::new(config.reuse_policy),
            version: config.format_version,
            config,
            state: SessionState::Created,
            path: None,
            trailer: Trailer::default(),
            original: None,
            original_startxref: None,
            last_save: None,
            pending: None,
            saves: 0,
        }
    }

    /// Open an existing store. Identity entries are read eagerly, payloads
    /// on first access.
    pub fn open(path: &Path, config: SessionConfig) -> SessionResult<Self> {
        let reader = Rc::new(FileReader::open(path)?);
        let store = reader.load()?;
        info!(
            path = %path.display(),
            version = %store.version,
            objects = store.table.live_count(),
            rebuilt = store.rebuilt,
            "opened document"
        );
        let registry = ObjectRegistry::with_reader(
            Box::new(Rc::clone(&reader)),
            store.table,
            config.reuse_policy,
        );
        Ok(Self {
            config,
            state: SessionState::Parsed,
            path: Some(path.to_path_buf()),
            version: store.version,
            registry,
            trailer: store.trailer,
            original: Some(reader),
            original_startxref: store.startxref,
            last_save: None,
            pending: None,
            saves: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> SessionResult<&mut ObjectRegistry> {
        self.ensure_open()?;
        Ok(&mut self.registry)
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn root(&self) -> Option<ObjectRef> {
        self.trailer.root
    }

    pub fn set_root(&mut self, root: ObjectRef) -> SessionResult<()> {
        self.ensure_open()?;
        self.trailer.root = Some(root);
        Ok(())
    }

    /// The revision id of the last save, or the one read from the store.
    pub fn revision_id(&self) -> Option<RevisionId> {
        self.trailer.id
    }

    /// A copy of the Info dictionary, if the trailer names a live one.
    pub fn info(&self) -> SessionResult<Option<Dictionary>> {
        let Some(reference) = self.trailer.info else {
            return Ok(None);
        };
        Ok(self
            .registry
            .lookup(reference)?
            .and_then(|handle| handle.payload_cloned())
            .and_then(|payload| payload.as_dictionary().cloned()))
    }

    /// Replace the Info dictionary, allocating an object for it if needed.
    pub fn set_info(&mut self, info: Dictionary) -> SessionResult<ObjectRef> {
        self.ensure_open()?;
        let existing = match self.trailer.info {
            Some(reference) => self.registry.lookup(reference)?,
            None => None,
        };
        let reference = match existing {
            Some(handle) => {
                self.registry
                    .update(handle.number(), Payload::Dictionary(info))?;
                handle.object_ref()
            }
            None => self.registry.allocate(Payload::Dictionary(info)).object_ref(),
        };
        self.trailer.info = Some(reference);
        Ok(reference)
    }

    /// Deep-copy object `number` of `source` into this document.
    pub fn import(&mut self, source: &Document, number: u32) -> SessionResult<Rc<ObjectHandle>> {
        self.ensure_open()?;
        let mut importer = Importer::new(&source.registry, &self.registry);
        let handle = importer.import(number, &mut self.registry)?;
        debug!(
            foreign = number,
            local = handle.number(),
            copies = importer.copies(),
            "imported object graph"
        );
        Ok(handle)
    }

    /// Free every in-use object not reachable from `/Root` or `/Info`.
    /// Returns the freed numbers.
    pub fn prune_unreachable(&mut self) -> SessionResult<Vec<u32>> {
        self.ensure_open()?;
        let roots: Vec<ObjectRef> = [self.trailer.root, self.trailer.info]
            .into_iter()
            .flatten()
            .collect();
        let reachable: BTreeSet<u32> = self.registry.reachable_from(&roots)?;
        let mut freed = Vec::new();
        for number in self.registry.live_numbers() {
            if !reachable.contains(&number) {
                self.registry.remove(number)?;
                freed.push(number);
            }
        }
        info!(freed = freed.len(), kept = reachable.len(), "pruned unreachable objects");
        Ok(freed)
    }

    /// Save to the document's own path.
    ///
    /// The output goes to a temporary file that [`close`](Self::close)
    /// promotes. An incremental save of a document that has never been
    /// written falls back to a standard save.
    pub fn save(&mut self, mode: SaveMode) -> SessionResult<SaveReport> {
        self.ensure_open()?;
        let path = self.path.clone().ok_or(SessionError::NoPath)?;
        self.stamp_info()?;

        let base = match (&self.last_save, &self.original, self.original_startxref) {
            (Some(image), _, _) => Some(BaseStore {
                bytes: &image.bytes,
                startxref: image.startxref,
            }),
            (None, Some(reader), Some(startxref)) => Some(BaseStore {
                bytes: reader.bytes(),
                startxref,
            }),
            _ => None,
        };
        let mode = match (mode, base) {
            (SaveMode::Incremental, None) => {
                info!("no prior store to append to; saving in standard mode");
                SaveMode::Standard
            }
            (mode, _) => mode,
        };

        let info = self.info()?;
        let sequence = self.saves + 1;
        let previous = self.trailer.id;
        let revision_for = |length: u64| {
            next_revision(
                previous,
                &RevisionInputs {
                    timestamp: Utc::now(),
                    path: Some(&path),
                    length,
                    info: info.as_ref(),
                    sequence,
                },
            )
        };
        let writer = DocumentWriter::new(&self.registry, self.config.write_options(self.version));
        let output = writer.write(mode, &self.trailer, base, |length| Some(revision_for(length)))?;

        let pending = self.write_pending(&path, &output.bytes)?;
        let revision = match output.trailer.id {
            Some(id) => id,
            None => revision_for(output.bytes.len() as u64),
        };

        // Commit only after the bytes are safely on disk.
        self.pending = Some(pending);
        self.saves = sequence;
        self.trailer = output.trailer;
        self.trailer.id = Some(revision);
        self.last_save = Some(SavedImage {
            startxref: output.startxref,
            bytes: output.bytes,
        });
        self.state = SessionState::Saved;
        info!(
            path = %path.display(),
            mode = %mode,
            objects = output.objects_written,
            revision = %revision,
            "saved document"
        );
        Ok(SaveReport {
            mode,
            bytes: self.last_save.as_ref().map_or(0, |image| image.bytes.len() as u64),
            objects_written: output.objects_written,
            revision,
        })
    }

    /// Set the target path, then [`save`](Self::save).
    pub fn save_to(&mut self, path: &Path, mode: SaveMode) -> SessionResult<SaveReport> {
        self.ensure_open()?;
        if self.path.as_deref() != Some(path) {
            // A pending file belongs to the old target.
            self.pending = None;
            self.path = Some(path.to_path_buf());
        }
        self.save(mode)
    }

    /// Recompute the version half of the revision id without saving.
    /// The base half is kept, or set now if the document has none.
    pub fn update_revision_id(&mut self) -> SessionResult<RevisionId> {
        self.ensure_open()?;
        let info = self.info()?;
        self.saves += 1;
        let length = self
            .last_save
            .as_ref()
            .map(|image| image.bytes.len() as u64)
            .or_else(|| self.original.as_ref().map(|reader| reader.len() as u64))
            .unwrap_or(0);
        let revision = next_revision(
            self.trailer.id,
            &RevisionInputs {
                timestamp: Utc::now(),
                path: self.path.as_deref(),
                length,
                info: info.as_ref(),
                sequence: self.saves,
            },
        );
        self.trailer.id = Some(revision);
        debug!(revision = %revision, "updated revision id");
        Ok(revision)
    }

    /// Promote the pending save over the target and end the session.
    ///
    /// Calling `close` again is a no-op. If the rename fails the session
    /// stays open with its pending file, so `close` can be retried.
    pub fn close(&mut self) -> SessionResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        if let Some(pending) = self.pending.take() {
            let path = self.path.clone().ok_or(SessionError::NoPath)?;
            if let Err(e) = pending.persist(&path) {
                self.pending = Some(e.file);
                return Err(SessionError::SaveFailed {
                    path,
                    source: e.error,
                });
            }
            info!(path = %path.display(), "replaced document");
        }
        self.state = SessionState::Closed;
        Ok(())
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.state == SessionState::Closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn stamp_info(&mut self) -> SessionResult<()> {
        if self.config.producer.is_none() && !self.config.update_info_dates {
            return Ok(());
        }
        let mut info = self.info()?.unwrap_or_default();
        if let Some(producer) = &self.config.producer {
            info.insert("Producer", Payload::string(producer.as_bytes().to_vec()));
        }
        if self.config.update_info_dates {
            let now = format_date(Utc::now());
            if !info.contains_key("CreationDate") {
                info.insert("CreationDate", Payload::string(now.as_bytes().to_vec()));
            }
            info.insert("ModDate", Payload::string(now.into_bytes()));
        }
        self.set_info(info)?;
        Ok(())
    }

    fn write_pending(&self, path: &Path, bytes: &[u8]) -> SessionResult<NamedTempFile> {
        let failed = |source: std::io::Error| SessionError::SaveFailed {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(failed)?;
        file.write_all(bytes).map_err(failed)?;
        if self.config.sync_on_save {
            file.as_file().sync_all().map_err(failed)?;
        }
        debug!(temp = %file.path().display(), bytes = bytes.len(), "wrote pending save");
        Ok(file)
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if self.pending.is_some() && self.state != SessionState::Closed {
            warn!(
                path = ?self.path,
                "document dropped with an unpromoted save; call close() to keep it"
            );
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("state", &self.state)
            .field("path", &self.path)
            .field("version", &self.version)
            .field("high_water", &self.registry.high_water())
            .field("pending", &self.pending.is_some())
            .finish()
    }
}
