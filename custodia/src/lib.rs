//! # `Custodia`
//!
//! Field-level encryption and searchable hash indexing for customer
//! records.
//!
//! ## Features
//!
//! - Per-field encryption through a pluggable key-management oracle
//! - Salted HMAC-SHA256 projections for equality lookup without decryption
//! - All-or-nothing record encoding with concurrent per-field calls
//! - Duplicate detection on document number and email by hash
//! - Customer use cases over any record store
//!
//! ## Example
//!
//! ```rust,ignore
//! use custodia::prelude::*;
//!
//! let settings = Settings::load(None)?;
//! let store = Arc::new(MemoryRecordStore::new());
//! let service = CustomerService::from_settings(kms, store, &settings)?;
//!
//! let customer = service.create(new_customer).await?;
//! let found = service.find_by_email("jane@example.com").await?;
//! assert_eq!(found.id, customer.id);
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cipher;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod guard;
pub mod hashing;
pub mod kms;
pub mod record;
pub mod service;
pub mod store;
pub mod validation;
pub mod view;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::cipher::{Ciphertext, FieldCipher};
    pub use crate::codec::SensitiveFieldCodec;
    pub use crate::config::Settings;
    pub use crate::context::FieldContext;
    pub use crate::error::{Error, KmsError, StoreError};
    pub use crate::guard::DuplicateGuard;
    pub use crate::hashing::{Digest, HashingService};
    pub use crate::kms::KeyManagementClient;
    pub use crate::record::{Address, AtRestRecord, CustomerId, HashIndex, PlaintextRecord};
    pub use crate::service::{CustomerService, CustomerUpdate, NewCustomer, ServiceError};
    pub use crate::store::{MemoryRecordStore, RecordStore};
    pub use crate::view::CustomerView;
}
