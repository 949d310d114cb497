//! Per-field encryption on top of a key-management oracle.
//!
//! `FieldCipher` turns string fields into text-safe ciphertext tokens
//! (standard base64 of the oracle's blob) and back. It makes exactly one
//! oracle call per field per direction.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::context::FieldContext;
use crate::error::Error;
use crate::kms::KeyManagementClient;

/// A base64 ciphertext token as stored at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ciphertext(String);

impl Ciphertext {
    /// Wraps a token read back from storage.
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Encrypts and decrypts individual string fields.
///
/// # Example
///
/// ```ignore
/// use custodia::cipher::FieldCipher;
/// use custodia::context::FieldContext;
///
/// let cipher = FieldCipher::new(kms, Some("alias/customers".to_string()));
/// let ctx = FieldContext::new("customers", "email");
///
/// let token = cipher.encrypt("jane@example.com", &ctx).await?;
/// assert_eq!(cipher.decrypt(&token, &ctx).await?, "jane@example.com");
/// ```
pub struct FieldCipher<K: KeyManagementClient> {
    client: Arc<K>,
    key_id: Option<String>,
}

impl<K: KeyManagementClient> FieldCipher<K> {
    /// Creates a cipher using `key_id` for encryption.
    ///
    /// A missing key id is not an error here; it surfaces as
    /// `Error::KeyUnavailable` on the first `encrypt`.
    pub fn new(client: K, key_id: Option<String>) -> Self {
        Self::from_shared(Arc::new(client), key_id)
    }

    /// Creates a cipher over an already shared client.
    pub fn from_shared(client: Arc<K>, key_id: Option<String>) -> Self {
        Self { client, key_id: key_id.filter(|k| !k.trim().is_empty()) }
    }

    /// Creates a cipher with the key id from `settings`.
    pub fn from_settings(client: Arc<K>, settings: &Settings) -> Self {
        Self::from_shared(client, settings.kms_key_id().map(str::to_string))
    }

    /// Encrypts a single field value.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `Error::KeyUnavailable` if no key id is configured or the oracle
    ///   cannot find the key
    /// - `Error::RemoteService` if the oracle call fails
    pub async fn encrypt(&self, plaintext: &str, context: &FieldContext) -> Result<Ciphertext, Error> {
        let key_id = self
            .key_id
            .as_deref()
            .ok_or_else(|| Error::KeyUnavailable("no KMS key id configured".to_string()))?;

        let blob = self.client.encrypt(key_id, plaintext.as_bytes(), context).await?;
        Ok(Ciphertext(STANDARD.encode(blob)))
    }

    /// Decrypts a single field token.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `Error::MalformedCiphertext` if the token is not base64, the oracle
    ///   rejects the blob, or the plaintext is not UTF-8
    /// - `Error::RemoteService` if the oracle call fails
    pub async fn decrypt(&self, token: &Ciphertext, context: &FieldContext) -> Result<String, Error> {
        let blob = STANDARD
            .decode(token.as_str())
            .map_err(|e| Error::MalformedCiphertext(format!("{context}: {e}")))?;
        if blob.is_empty() {
            return Err(Error::MalformedCiphertext(format!("{context}: empty token")));
        }

        let plaintext = self.client.decrypt(&blob, context).await?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::MalformedCiphertext(format!("{context}: plaintext is not UTF-8")))
    }
}

impl<K: KeyManagementClient> Clone for FieldCipher<K> {
    fn clone(&self) -> Self {
        Self { client: Arc::clone(&self.client), key_id: self.key_id.clone() }
    }
}
