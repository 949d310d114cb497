//! AWS KMS oracle for `custodia`.
//!
//! Each field value is sent to KMS `Encrypt` with the field's table and
//! column as encryption context, so a ciphertext only decrypts for the
//! column it was written to.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use custodia::prelude::*;
//! use custodia_kms_aws::AwsKmsClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kms = AwsKmsClient::new().await;
//! let cipher = FieldCipher::new(kms, Some("alias/customers".to_string()));
//!
//! let ctx = FieldContext::new("customers", "email");
//! let token = cipher.encrypt("jane@example.com", &ctx).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # AWS Configuration
//!
//! The client uses the AWS SDK's default credential chain:
//! - Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
//! - AWS credentials file (~/.aws/credentials)
//! - IAM instance profile (for EC2)
//! - ECS task role
//! - Web identity token (for EKS)

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::fmt::Debug;

use async_trait::async_trait;
use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_kms::operation::decrypt::DecryptError;
use aws_sdk_kms::operation::encrypt::EncryptError;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::Client;
use custodia::context::FieldContext;
use custodia::error::KmsError;
use custodia::kms::KeyManagementClient;

const ACCESS_DENIED: &str = "AccessDeniedException";

/// KMS-backed oracle.
#[derive(Clone)]
pub struct AwsKmsClient {
    client: Client,
}

impl AwsKmsClient {
    /// Creates a client from the default AWS configuration chain.
    pub async fn new() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::from_client(Client::new(&config))
    }

    /// Wraps an already configured SDK client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeyManagementClient for AwsKmsClient {
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &FieldContext,
    ) -> Result<Vec<u8>, KmsError> {
        let mut request =
            self.client.encrypt().key_id(key_id).plaintext(Blob::new(plaintext.to_vec()));
        for (k, v) in context.pairs() {
            request = request.encryption_context(k, v);
        }

        let response = request.send().await.map_err(|e| {
            classify(e, |err: &EncryptError| {
                (err.is_not_found_exception()
                    || err.is_disabled_exception()
                    || err.is_key_unavailable_exception()
                    || err.is_kms_invalid_state_exception())
                .then(|| KmsError::KeyNotFound(key_id.to_string()))
            })
        })?;

        response
            .ciphertext_blob()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| KmsError::Service("no ciphertext returned".to_string()))
    }

    async fn decrypt(&self, ciphertext: &[u8], context: &FieldContext) -> Result<Vec<u8>, KmsError> {
        let mut request = self.client.decrypt().ciphertext_blob(Blob::new(ciphertext.to_vec()));
        for (k, v) in context.pairs() {
            request = request.encryption_context(k, v);
        }

        let response = request.send().await.map_err(|e| {
            classify(e, |err: &DecryptError| {
                if err.is_invalid_ciphertext_exception() || err.is_incorrect_key_exception() {
                    Some(KmsError::InvalidCiphertext(message(err)))
                } else if err.is_not_found_exception()
                    || err.is_disabled_exception()
                    || err.is_key_unavailable_exception()
                {
                    Some(KmsError::KeyNotFound(message(err)))
                } else {
                    None
                }
            })
        })?;

        response
            .plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| KmsError::Service("no plaintext returned".to_string()))
    }
}

fn message<E: ProvideErrorMetadata>(err: &E) -> String {
    err.message().unwrap_or("no message").to_string()
}

/// Maps an SDK failure onto the oracle error taxonomy.
///
/// `specific` classifies modeled service exceptions of one operation.
fn classify<E, R>(err: SdkError<E, R>, specific: impl FnOnce(&E) -> Option<KmsError>) -> KmsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug,
{
    let mapped = match &err {
        SdkError::TimeoutError(_) => KmsError::Timeout,
        SdkError::ServiceError(service) => {
            let inner = service.err();
            specific(inner).unwrap_or_else(|| {
                if inner.code() == Some(ACCESS_DENIED) {
                    KmsError::AccessDenied(message(inner))
                } else {
                    KmsError::Service(DisplayErrorContext(inner).to_string())
                }
            })
        }
        _ => KmsError::Service(DisplayErrorContext(&err).to_string()),
    };
    tracing::debug!(error = %mapped, "KMS call failed");
    mapped
}
