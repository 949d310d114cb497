//! Salted hash projections for equality lookup over encrypted fields.
//!
//! A hash projection lets the store index a field without ever holding its
//! plaintext. It is computed as `HMAC-SHA256(salt, value)` and stored as
//! standard base64. Two values hash equal only if they are equal, and a
//! digest cannot be compared with digests produced under a different salt.

use std::borrow::Cow;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::Settings;
use crate::error::Error;
use crate::format;
use crate::record::HashIndex;

type HmacSha256 = Hmac<Sha256>;

/// Raw digest size before encoding (256 bits).
pub const DIGEST_SIZE: usize = 32;

/// A base64-encoded hash projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wraps an already-encoded digest, e.g. one read back from storage.
    #[must_use]
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Returns the encoded digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Computes hash projections under a process-wide salt.
///
/// Cloning is cheap; clones share the salt.
#[derive(Clone)]
pub struct HashingService {
    salt: Arc<SecretVec<u8>>,
}

impl HashingService {
    /// Creates a hashing service with the given salt.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the salt is empty.
    pub fn new(salt: SecretVec<u8>) -> Result<Self, Error> {
        if salt.expose_secret().is_empty() {
            return Err(Error::Config("hash salt must not be empty".to_string()));
        }
        Ok(Self { salt: Arc::new(salt) })
    }

    /// Creates a hashing service from loaded settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configured salt is empty.
    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        let salt = settings.hash_salt().expose_secret().as_bytes().to_vec();
        Self::new(SecretVec::new(salt))
    }

    /// Hashes `value` as given.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `value` is empty or whitespace-only.
    ///
    /// # Example
    ///
    /// ```
    /// use custodia::hashing::HashingService;
    /// use secrecy::SecretVec;
    ///
    /// let hasher = HashingService::new(SecretVec::new(b"salt".to_vec())).unwrap();
    /// let a = hasher.hash("98765432100").unwrap();
    /// let b = hasher.hash("98765432100").unwrap();
    /// assert_eq!(a, b);
    /// ```
    pub fn hash(&self, value: &str) -> Result<Digest, Error> {
        if value.trim().is_empty() {
            return Err(Error::InvalidInput("value to hash must not be empty".to_string()));
        }

        let mut mac = HmacSha256::new_from_slice(self.salt.expose_secret())
            .map_err(|e| Error::Config(format!("invalid hash salt: {e}")))?;
        mac.update(value.as_bytes());
        let bytes = mac.finalize().into_bytes();

        Ok(Digest(STANDARD.encode(bytes)))
    }

    /// Hashes `value` after applying the normalization rule of `index`.
    ///
    /// This is the only path used to build index keys, on writes and on
    /// lookups alike, so formatting variants of the same value always
    /// land on the same digest.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the normalized value is empty.
    pub fn index_key(&self, index: HashIndex, value: &str) -> Result<Digest, Error> {
        self.hash(&normalize(index, value))
    }
}

/// Canonical form of a value before it is hashed for `index`.
///
/// Document numbers keep only their digits; emails are trimmed and
/// lowercased (ASCII).
#[must_use]
pub fn normalize(index: HashIndex, value: &str) -> Cow<'_, str> {
    match index {
        HashIndex::DocumentNumber => Cow::Owned(format::unformat(value)),
        HashIndex::Email => {
            let trimmed = value.trim();
            if trimmed.bytes().any(|b| b.is_ascii_uppercase()) {
                Cow::Owned(trimmed.to_ascii_lowercase())
            } else {
                Cow::Borrowed(trimmed)
            }
        }
    }
}
