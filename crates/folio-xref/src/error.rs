use thiserror::Error;

use folio_registry::RegistryError;
use folio_types::FormatVersion;

#[derive(Debug, Error)]
pub enum XrefError {
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(FormatVersion),

    #[error("syntax error at offset {offset}: {reason}")]
    Syntax { offset: u64, reason: String },

    #[error("corrupt cross-reference data at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("offset {0} does not fit a cross-reference entry")]
    OffsetOverflow(u64),

    /// A written entry does not point at its object header. This is a bug
    /// in the writer, not a recoverable condition.
    #[error("cross-reference entry for object {number} points at {offset}, where no matching object header was written")]
    XrefInconsistent { number: u32, offset: u64 },

    #[error("object number {number} exceeds the limit of {limit}")]
    ObjectLimit { number: u32, limit: u32 },

    #[error("encrypted documents are not supported")]
    EncryptedUnsupported,

    #[error("incremental save requires the original store bytes")]
    MissingBase,

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type XrefResult<T> = Result<T, XrefError>;

impl From<XrefError> for RegistryError {
    fn from(e: XrefError) -> Self {
        match e {
            XrefError::Registry(inner) => inner,
            other => RegistryError::Reader(other.to_string()),
        }
    }
}
