//! Error types for `custodia` operations.

use std::fmt;

use crate::record::CustomerId;

/// Main error type for `custodia` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An empty or otherwise unusable value was supplied
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No KMS key is configured, or the configured key cannot be used
    #[error("KMS key unavailable: {0}")]
    KeyUnavailable(String),

    /// The KMS or the record store failed
    #[error("remote service error: {0}")]
    RemoteService(String),

    /// Stored ciphertext cannot be decoded into a plaintext value
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// A record with the same document number hash already exists
    #[error("a customer with this document number already exists")]
    DuplicateDocumentNumber,

    /// A record with the same email hash already exists
    #[error("a customer with this email already exists")]
    DuplicateEmail,

    /// No record is stored under the given identity
    #[error("customer not found: {0}")]
    NotFound(CustomerId),

    /// Configuration could not be loaded or is incomplete
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for duplicate-guard conflicts.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::DuplicateDocumentNumber | Self::DuplicateEmail)
    }
}

/// Errors reported by a key-management oracle.
#[derive(Debug)]
pub enum KmsError {
    /// The key does not exist, is disabled or is pending deletion
    KeyNotFound(String),

    /// The caller is not allowed to use the key
    AccessDenied(String),

    /// The call did not complete in time
    Timeout,

    /// The oracle rejected the ciphertext blob
    InvalidCiphertext(String),

    /// Any other oracle failure
    Service(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound(id) => write!(f, "key not found: {id}"),
            Self::AccessDenied(msg) => write!(f, "access denied: {msg}"),
            Self::Timeout => write!(f, "KMS call timed out"),
            Self::InvalidCiphertext(msg) => write!(f, "invalid ciphertext: {msg}"),
            Self::Service(msg) => write!(f, "KMS call failed: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KmsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KmsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<KmsError> for Error {
    fn from(err: KmsError) -> Self {
        match err {
            KmsError::KeyNotFound(id) => Self::KeyUnavailable(id),
            KmsError::InvalidCiphertext(msg) => Self::MalformedCiphertext(msg),
            other => Self::RemoteService(other.to_string()),
        }
    }
}

/// Errors reported by a record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store rejected or failed the request
    #[error("store request failed: {0}")]
    Backend(String),

    /// A stored item does not have the expected shape
    #[error("corrupt item {id}: {message}")]
    CorruptItem {
        /// Primary key of the item, as stored
        id: String,
        /// What was wrong with it
        message: String,
    },
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::RemoteService(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kms_key_not_found_maps_to_key_unavailable() {
        let err: Error = KmsError::KeyNotFound("alias/customers".to_string()).into();
        assert!(matches!(err, Error::KeyUnavailable(id) if id == "alias/customers"));
    }

    #[test]
    fn test_kms_invalid_ciphertext_maps_to_malformed() {
        let err: Error = KmsError::InvalidCiphertext("bad blob".to_string()).into();
        assert!(matches!(err, Error::MalformedCiphertext(_)));
    }

    #[test]
    fn test_kms_timeout_maps_to_remote_service() {
        let err: Error = KmsError::Timeout.into();
        assert!(matches!(err, Error::RemoteService(msg) if msg.contains("timed out")));
    }

    #[test]
    fn test_store_error_maps_to_remote_service() {
        let err: Error = StoreError::Backend("throttled".to_string()).into();
        assert!(matches!(err, Error::RemoteService(_)));
    }

    #[test]
    fn test_conflicts() {
        assert!(Error::DuplicateEmail.is_conflict());
        assert!(Error::DuplicateDocumentNumber.is_conflict());
        assert!(!Error::InvalidInput("x".to_string()).is_conflict());
    }
}
