//! Customer use cases on top of the codec, guard and store.
//!
//! This is the only layer that sees both plaintext and the store. Inputs
//! are validated first, then the record is encoded, its hash projections
//! are checked for duplicates, and only then is it written. A record is
//! either fully written or not written at all.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};

use crate::codec::SensitiveFieldCodec;
use crate::config::Settings;
use crate::error::Error;
use crate::format;
use crate::guard::DuplicateGuard;
use crate::kms::KeyManagementClient;
use crate::record::{Address, CustomerId, HashIndex, PlaintextRecord};
use crate::store::RecordStore;
use crate::validation;

/// Failure of a customer use case, as reported to callers.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request was rejected; every message is safe to show the caller
    #[error("validation failed: {}", .0.join(" "))]
    Validation(Vec<String>),

    /// No customer exists under the requested key
    #[error("customer not found")]
    NotFound,

    /// Encryption, hashing or storage failed
    #[error("operation failed")]
    Operational(#[source] Error),
}

impl From<Error> for ServiceError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) => Self::Validation(vec![msg]),
            Error::DuplicateDocumentNumber => {
                Self::Validation(vec!["Customer with this document number already exists.".to_string()])
            }
            Error::DuplicateEmail => {
                Self::Validation(vec!["Customer with this email already exists.".to_string()])
            }
            Error::NotFound(_) => Self::NotFound,
            other => Self::Operational(other),
        }
    }
}

/// Maps an error for the caller, logging operational failures.
fn report(err: Error) -> ServiceError {
    let mapped = ServiceError::from(err);
    match &mapped {
        ServiceError::Operational(source) => tracing::error!(error = %source, "customer operation failed"),
        ServiceError::Validation(messages) => warn!(count = messages.len(), "customer request rejected"),
        ServiceError::NotFound => {}
    }
    mapped
}

/// Data for a new customer.
#[derive(Clone)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    /// Formatted or bare; stored as digits only
    pub document_number: String,
    pub date_of_birth: NaiveDate,
    pub email: String,
    pub phone_number: String,
    pub address: Address,
}

/// Replacement data for an existing customer.
///
/// The document number cannot be changed.
#[derive(Clone)]
pub struct CustomerUpdate {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub email: String,
    pub phone_number: String,
    pub address: Address,
}

/// Customer registry over encrypted storage.
pub struct CustomerService<K: KeyManagementClient, S: RecordStore> {
    codec: SensitiveFieldCodec<K>,
    guard: DuplicateGuard<S>,
    store: Arc<S>,
}

impl<K: KeyManagementClient, S: RecordStore> CustomerService<K, S> {
    /// Creates a service; the guard shares the codec's hashing service.
    pub fn new(codec: SensitiveFieldCodec<K>, store: Arc<S>) -> Self {
        let guard = DuplicateGuard::new(Arc::clone(&store), codec.hasher().clone());
        Self { codec, guard, store }
    }

    /// Creates a service from loaded settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configured salt is unusable.
    pub fn from_settings(kms: Arc<K>, store: Arc<S>, settings: &Settings) -> Result<Self, Error> {
        Ok(Self::new(SensitiveFieldCodec::from_settings(kms, settings)?, store))
    }

    /// Registers a new customer.
    ///
    /// # Errors
    ///
    /// `ServiceError::Validation` for invalid input or a duplicate
    /// document number or email; `ServiceError::Operational` otherwise.
    #[instrument(skip_all)]
    pub async fn create(&self, input: NewCustomer) -> Result<PlaintextRecord, ServiceError> {
        let errors = validation::new_customer(&input, Utc::now().date_naive());
        if !errors.is_empty() {
            warn!(count = errors.len(), "customer request rejected");
            return Err(ServiceError::Validation(errors));
        }

        let document_number = format::unformat(&input.document_number);
        let now = Utc::now();
        let record = PlaintextRecord {
            id: CustomerId::generate(),
            first_name: input.first_name,
            last_name: input.last_name,
            document_number,
            date_of_birth: input.date_of_birth,
            email: input.email.trim().to_string(),
            phone_number: input.phone_number,
            address: input.address,
            created_at: now,
            updated_at: now,
        };

        let at_rest = self.codec.encode(&record).await.map_err(report)?;
        self.guard.check_record(&at_rest).await.map_err(report)?;
        self.store.put(at_rest).await.map_err(|e| report(e.into()))?;

        info!(customer_id = %record.id, "customer created");
        Ok(record)
    }

    /// Fetches a customer by identity.
    ///
    /// # Errors
    ///
    /// `ServiceError::NotFound` if absent; `ServiceError::Operational` if
    /// the store or decryption fails.
    #[instrument(skip_all, fields(customer_id = %id))]
    pub async fn get(&self, id: CustomerId) -> Result<PlaintextRecord, ServiceError> {
        let at_rest = self.load(id).await?;
        self.codec.decode(&at_rest).await.map_err(report)
    }

    /// Finds a customer by document number, in any formatting.
    ///
    /// # Errors
    ///
    /// `ServiceError::Validation` for an empty document number,
    /// `ServiceError::NotFound` if no customer matches.
    #[instrument(skip_all)]
    pub async fn find_by_document_number(&self, document_number: &str) -> Result<PlaintextRecord, ServiceError> {
        self.find_by(HashIndex::DocumentNumber, document_number).await
    }

    /// Finds a customer by email, ignoring case and surrounding spaces.
    ///
    /// # Errors
    ///
    /// `ServiceError::Validation` for an empty email,
    /// `ServiceError::NotFound` if no customer matches.
    #[instrument(skip_all)]
    pub async fn find_by_email(&self, email: &str) -> Result<PlaintextRecord, ServiceError> {
        self.find_by(HashIndex::Email, email).await
    }

    /// Lists every customer. An empty registry yields an empty list.
    ///
    /// # Errors
    ///
    /// `ServiceError::Operational` if the scan or any decryption fails.
    #[instrument(skip_all)]
    pub async fn list(&self) -> Result<Vec<PlaintextRecord>, ServiceError> {
        let records = self.store.scan_all().await.map_err(|e| report(e.into()))?;
        let count = records.len();
        let decoded = self.codec.decode_all(records).await.map_err(report)?;
        info!(count, "customers listed");
        Ok(decoded)
    }

    /// Replaces a customer's mutable fields and re-encrypts the record.
    ///
    /// # Errors
    ///
    /// `ServiceError::Validation` for invalid input or an email owned by
    /// another customer, `ServiceError::NotFound` if absent.
    #[instrument(skip_all, fields(customer_id = %id))]
    pub async fn update(&self, id: CustomerId, input: CustomerUpdate) -> Result<PlaintextRecord, ServiceError> {
        let errors = validation::customer_update(&input, Utc::now().date_naive());
        if !errors.is_empty() {
            warn!(count = errors.len(), "customer request rejected");
            return Err(ServiceError::Validation(errors));
        }

        let existing = self.codec.decode(&self.load(id).await?).await.map_err(report)?;
        self.guard.check_email_for(id, &input.email).await.map_err(report)?;

        let record = PlaintextRecord {
            first_name: input.first_name,
            last_name: input.last_name,
            date_of_birth: input.date_of_birth,
            email: input.email.trim().to_string(),
            phone_number: input.phone_number,
            address: input.address,
            updated_at: Utc::now(),
            ..existing
        };

        let at_rest = self.codec.encode(&record).await.map_err(report)?;
        self.store.put(at_rest).await.map_err(|e| report(e.into()))?;

        info!("customer updated");
        Ok(record)
    }

    /// Removes a customer.
    ///
    /// # Errors
    ///
    /// `ServiceError::NotFound` if absent.
    #[instrument(skip_all, fields(customer_id = %id))]
    pub async fn delete(&self, id: CustomerId) -> Result<(), ServiceError> {
        self.load(id).await?;
        self.store.delete(&id).await.map_err(|e| report(e.into()))?;
        info!("customer deleted");
        Ok(())
    }

    async fn load(&self, id: CustomerId) -> Result<crate::record::AtRestRecord, ServiceError> {
        if id.is_nil() {
            return Err(ServiceError::Validation(vec!["Invalid customer id.".to_string()]));
        }
        self.store
            .get(&id)
            .await
            .map_err(|e| report(e.into()))?
            .ok_or(ServiceError::NotFound)
    }

    async fn find_by(&self, index: HashIndex, value: &str) -> Result<PlaintextRecord, ServiceError> {
        let digest = self.codec.hasher().index_key(index, value).map_err(report)?;
        let at_rest = self
            .store
            .get_by_hash(index, &digest)
            .await
            .map_err(|e| report(e.into()))?
            .ok_or(ServiceError::NotFound)?;
        self.codec.decode(&at_rest).await.map_err(report)
    }
}
