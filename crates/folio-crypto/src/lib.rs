//! Content hashing for folio.
//!
//! - [`ContentHasher`]: domain-separated BLAKE3 hashing; revision
//!   fingerprints are built on it.

pub mod hasher;

pub use hasher::{ContentHasher, DigestBuilder};
