//! Key-management oracle abstraction.

use async_trait::async_trait;

use crate::context::FieldContext;
use crate::error::KmsError;

/// Performs envelope encryption of byte strings under a managed key.
///
/// Implementations talk to a remote service (or, for development, to
/// local key files) and must be thread-safe (`Send + Sync`) so one client
/// can serve many concurrent field operations.
///
/// Encryption must be non-deterministic: encrypting the same plaintext
/// twice yields different blobs. The `context` must be bound to the blob,
/// and `decrypt` must fail when given a different context.
///
/// # Example
///
/// ```rust,ignore
/// use custodia::kms::KeyManagementClient;
///
/// struct MyKms;
///
/// #[async_trait::async_trait]
/// impl KeyManagementClient for MyKms {
///     async fn encrypt(&self, key_id: &str, plaintext: &[u8], context: &FieldContext)
///         -> Result<Vec<u8>, KmsError> {
///         // Implementation
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait KeyManagementClient: Send + Sync {
    /// Encrypts `plaintext` under the key identified by `key_id`.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::KeyNotFound` if the key does not exist or is
    /// disabled, and another `KmsError` variant if the call fails.
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &FieldContext,
    ) -> Result<Vec<u8>, KmsError>;

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// The key is identified by the blob itself.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::InvalidCiphertext` if the blob is not valid for
    /// this oracle or context, and another `KmsError` variant if the call
    /// fails.
    async fn decrypt(&self, ciphertext: &[u8], context: &FieldContext) -> Result<Vec<u8>, KmsError>;
}
