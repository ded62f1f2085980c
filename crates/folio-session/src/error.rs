use std::path::PathBuf;

use thiserror::Error;

use folio_registry::RegistryError;
use folio_xref::XrefError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("encrypted documents are not supported")]
    EncryptedUnsupported,

    #[error("session is closed")]
    Closed,

    #[error("document has no path; save it with save_to first")]
    NoPath,

    /// The in-memory state is untouched; the save can be retried.
    #[error("save to {path} failed: {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("cross-reference error: {0}")]
    Xref(XrefError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<XrefError> for SessionError {
    fn from(e: XrefError) -> Self {
        match e {
            XrefError::EncryptedUnsupported => Self::EncryptedUnsupported,
            XrefError::Registry(inner) => Self::Registry(inner),
            XrefError::Io(inner) => Self::Io(inner),
            other => Self::Xref(other),
        }
    }
}
