//! Document persistence sessions.
//!
//! A [`Document`] owns one [`ObjectRegistry`](folio_registry::ObjectRegistry)
//! and the trailer state around it. It opens an existing store, lets the
//! caller mutate the object graph, and writes it back in one of three
//! layouts:
//!
//! - **Standard**: a full rewrite with one cross-reference section
//! - **Incremental**: the prior bytes untouched, followed by the modified
//!   objects and a section that chains to the previous one via `/Prev`
//! - **Linearized**: a full rewrite with the first page's objects up front
//!   and a linearization parameter dictionary as the first object
//!
//! Saves land in a temporary file beside the target. [`Document::close`]
//! renames it over the target, so the original is never half-written.
//!
//! ```no_run
//! use folio_session::{Document, SessionConfig};
//! use folio_types::Payload;
//! use folio_xref::SaveMode;
//!
//! # fn main() -> folio_session::SessionResult<()> {
//! let mut doc = Document::open("report.pdf".as_ref(), SessionConfig::default())?;
//! doc.registry_mut()?.allocate(Payload::name("Annotation"));
//! doc.save(SaveMode::Incremental)?;
//! doc.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod revision;
pub mod session;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use revision::{format_date, next_revision, version_fingerprint, RevisionInputs};
pub use session::{Document, SaveReport, SessionState};
