use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt::{self, Display};
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Identifier of a secondary store, unique within its factory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StoreId(pub u64);

impl Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An error that can occur when using a secondary store.
#[derive(Clone, Error, Debug, PartialEq, Eq, Serialize)]
pub enum StoreError {
    /// I/O error.
    #[error("{0}")]
    #[serde(serialize_with = "serialize_io_error")]
    StdIo(ErrorKind),

    /// The store was closed and can no longer be used.
    #[error("Secondary store {0} is closed.")]
    Closed(StoreId),

    /// The backend does not support the requested operation.
    ///
    /// The in-memory backend, for example, has no cache to size and no
    /// directory to work in.  Callers that depend on such settings for
    /// durability must not proceed as if the call succeeded.
    #[error("The {backend} store backend does not support {operation}.")]
    Unsupported {
        backend: &'static str,
        operation: String,
    },

    /// The working directory given to the backend is not usable.
    #[error("Invalid working directory: {}", .0.display())]
    InvalidPath(PathBuf),
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::StdIo(value.kind())
    }
}

fn serialize_io_error<S>(kind: &ErrorKind, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut ser = serializer.serialize_struct("IOError", 1)?;
    ser.serialize_field("kind", &kind.to_string())?;
    ser.end()
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::StdIo(kind) => *kind,
            StoreError::Closed(_) => ErrorKind::BrokenPipe,
            StoreError::Unsupported { .. } => ErrorKind::Unsupported,
            StoreError::InvalidPath(_) => ErrorKind::InvalidInput,
        }
    }

    pub(crate) fn unsupported(backend: &'static str, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            backend,
            operation: operation.into(),
        }
    }
}
