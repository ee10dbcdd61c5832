use std::fmt;

use imgdb_crypto::IdentityError;
use imgdb_types::{Identity, TypeError};

/// A region of the store file, used to locate corruption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Header,
    Blob,
    Mapper,
    Catalog,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Blob => write!(f, "blob region"),
            Self::Mapper => write!(f, "mapper table"),
            Self::Catalog => write!(f, "metadata catalog"),
        }
    }
}

/// Errors from image database operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with this identity.
    #[error("image not found: {0}")]
    NotFound(Identity),

    /// An insert is missing a required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A supplied field has a value that cannot be stored.
    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// An identity string could not be parsed.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// A structural invariant of the file was violated on read.
    #[error("corrupt store ({region}): {reason}")]
    CorruptStore { region: Region, reason: String },

    /// Serialization failure while encoding a table.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn corrupt(region: Region, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            region,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors a caller is expected to handle as ordinary
    /// outcomes (absent identity, incomplete insert, malformed identity).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::MissingField(_)
                | Self::InvalidField { .. }
                | Self::InvalidIdentity(_)
        )
    }
}

impl From<TypeError> for StoreError {
    fn from(e: TypeError) -> Self {
        Self::InvalidIdentity(e.to_string())
    }
}

impl From<IdentityError> for StoreError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Serialization(msg) => Self::Serialization(msg),
            IdentityError::InvalidInput(msg) => Self::InvalidIdentity(msg),
            IdentityError::NonFinite(field) => Self::InvalidField {
                field,
                reason: "must be a finite number".into(),
            },
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
