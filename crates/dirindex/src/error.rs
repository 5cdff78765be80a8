use dirindex_storage::StoreError;
use std::io::ErrorKind;
use thiserror::Error;

/// An error decoding a serialized tree or a codec payload.
///
/// Decoding never applies partial results: when this error is returned, no
/// tree or value has been built.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The input was empty.
    #[error("Cannot decode an empty buffer.")]
    Empty,

    /// The input ended in the middle of a record.
    #[error("Input ended unexpectedly while decoding {0}.")]
    Truncated(&'static str),

    /// The input is structurally invalid.
    #[error("Malformed input: {0}")]
    Malformed(String),

    /// A key or value payload could not be decoded by its codec.
    #[error("Codec failed to decode payload: {0}")]
    Codec(String),
}

impl DecodeError {
    pub(crate) fn from_binrw(error: binrw::Error, what: &'static str) -> Self {
        if error.is_eof() {
            Self::Truncated(what)
        } else {
            Self::Malformed(format!("{what}: {error}"))
        }
    }
}

/// An error that can occur when using an index.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum IndexError {
    /// Serialized input could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A key or value could not be encoded by its codec.
    #[error("Codec failed to encode payload: {0}")]
    Encode(String),

    /// A cursor was read while it was not positioned on a tuple.
    #[error("Cursor is not positioned on a tuple.")]
    InvalidPosition,

    /// The operation has no meaning for this table or its backing store.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The table is configured in a way that does not allow the operation.
    #[error("Invalid configuration for table {table:?}: {reason}")]
    Configuration { table: String, reason: String },

    /// Every identifier of a master table has been handed out.
    #[error("Master table {0:?} has no identifiers left.")]
    IdsExhausted(String),

    /// Error reported by a secondary store.
    #[error(transparent)]
    Store(StoreError),

    /// I/O error.
    #[error("{0}")]
    StdIo(ErrorKind),
}

impl From<StoreError> for IndexError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unsupported { .. } => Self::Unsupported(value.to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<std::io::Error> for IndexError {
    fn from(value: std::io::Error) -> Self {
        Self::StdIo(value.kind())
    }
}

impl IndexError {
    pub(crate) fn configuration(table: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Decode(_) => ErrorKind::InvalidData,
            IndexError::Encode(_) => ErrorKind::InvalidInput,
            IndexError::InvalidPosition => ErrorKind::Other,
            IndexError::Unsupported(_) => ErrorKind::Unsupported,
            IndexError::Configuration { .. } => ErrorKind::InvalidInput,
            IndexError::IdsExhausted(_) => ErrorKind::StorageFull,
            IndexError::Store(error) => error.kind(),
            IndexError::StdIo(kind) => *kind,
        }
    }
}
