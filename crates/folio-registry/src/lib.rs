//! Indirect-object registry for folio.
//!
//! The registry assigns stable identities to the nodes of a mutable object
//! graph and keeps exactly one in-memory handle per identity for the life
//! of a session.
//!
//! # Components
//!
//! - [`IdentityEntry`] / [`IdentityTable`] -- per-slot bookkeeping read from
//!   the cross-reference table (number, generation, offset, usage)
//! - [`ObjectHandle`] -- shared, lazily bound representative of one identity
//! - [`ObjectRegistry`] -- allocation, lazy wake-up, update/remove and
//!   dedup-on-import
//! - [`Importer`] -- deep copy of payload graphs across registries
//! - [`BackingReader`] -- read contract of a backing store; [`InMemoryReader`]
//!   implements it for tests and embedding
//!
//! # Design Rules
//!
//! 1. Numbers are allocated monotonically and never recycled in a session.
//! 2. `get(n)` returns the same `Rc` until `n` is updated or removed.
//! 3. An original object is parsed at most once per registry.
//! 4. Unreadable or missing entries degrade to free; contract violations
//!    (bad number, wrong target, detached handle) fail immediately.
//! 5. Payloads hold `ObjectRef`s, never handles; resolution is a lookup.
//! 6. Registries are `!Send + !Sync`; parallelism means one registry per
//!    thread.

pub mod cloner;
pub mod entry;
pub mod error;
pub mod handle;
pub mod memory;
pub mod registry;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use cloner::Importer;
pub use entry::{IdentityEntry, IdentityTable, Usage};
pub use error::{RegistryError, RegistryResult};
pub use handle::{ObjectHandle, Origin, RegistryId};
pub use memory::InMemoryReader;
pub use registry::{ObjectRegistry, ReusePolicy};
pub use traits::{BackingReader, TrailerSnapshot};
