//! Foundation types for folio.
//!
//! This crate provides the value and identity types shared by every other
//! folio crate. It performs no I/O.
//!
//! # Key Types
//!
//! - [`ObjectRef`]: `(number, generation)` pair naming an indirect object
//! - [`Payload`]: the in-memory value of an object (scalars, containers, streams, references)
//! - [`Dictionary`]: ordered name → payload map
//! - [`FormatVersion`]: `major.minor` version from the file header
//! - [`RevisionId`]: base and version [`Fingerprint`]s identifying a saved revision

pub mod error;
pub mod object;
pub mod payload;
pub mod revision;
pub mod version;

pub use error::TypeError;
pub use object::{ObjectRef, MAX_GENERATION, MAX_OBJECT_NUMBER, UNREUSABLE_GENERATION};
pub use payload::{Dictionary, Payload, Stream};
pub use revision::{Fingerprint, RevisionId};
pub use version::FormatVersion;
