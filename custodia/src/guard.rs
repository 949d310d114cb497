//! Duplicate detection over hash projections.
//!
//! The guard never decrypts anything: it hashes the candidate values and
//! probes the store's secondary indexes. The check and the write that
//! follows it are separate round trips, so two concurrent creates can both
//! pass; stores that need a hard guarantee must enforce it themselves.

use std::sync::Arc;

use crate::error::Error;
use crate::hashing::{Digest, HashingService};
use crate::record::{AtRestRecord, CustomerId, HashIndex};
use crate::store::RecordStore;

/// Rejects records whose document number or email is already taken.
pub struct DuplicateGuard<S: RecordStore> {
    store: Arc<S>,
    hasher: HashingService,
}

impl<S: RecordStore> DuplicateGuard<S> {
    /// Creates a guard over `store`.
    pub fn new(store: Arc<S>, hasher: HashingService) -> Self {
        Self { store, hasher }
    }

    /// Checks a new record's identifying fields.
    ///
    /// The document number is probed first and wins when both collide.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `Error::DuplicateDocumentNumber` / `Error::DuplicateEmail` on conflict
    /// - `Error::InvalidInput` if either value is empty after normalization
    /// - `Error::RemoteService` if the store fails
    pub async fn check(&self, document_number: &str, email: &str) -> Result<(), Error> {
        let document_hash = self.hasher.index_key(HashIndex::DocumentNumber, document_number)?;
        let email_hash = self.hasher.index_key(HashIndex::Email, email)?;
        self.probe(&document_hash, &email_hash).await
    }

    /// Checks an encoded record using the projections it already carries.
    ///
    /// # Errors
    ///
    /// Same as [`check`](Self::check), minus input validation.
    pub async fn check_record(&self, record: &AtRestRecord) -> Result<(), Error> {
        self.probe(&record.document_number_hash, &record.email_hash).await
    }

    async fn probe(&self, document_hash: &Digest, email_hash: &Digest) -> Result<(), Error> {
        if self.store.get_by_hash(HashIndex::DocumentNumber, document_hash).await?.is_some() {
            return Err(Error::DuplicateDocumentNumber);
        }
        if self.store.get_by_hash(HashIndex::Email, email_hash).await?.is_some() {
            return Err(Error::DuplicateEmail);
        }
        Ok(())
    }

    /// Checks an updated email against every record other than `id`.
    ///
    /// Only the first index match is inspected, so an email already shared
    /// by `id` and another record is not reported.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateEmail` on conflict, `Error::InvalidInput`
    /// for an empty email, or `Error::RemoteService` if the store fails.
    pub async fn check_email_for(&self, id: CustomerId, email: &str) -> Result<(), Error> {
        let email_hash = self.hasher.index_key(HashIndex::Email, email)?;
        match self.store.get_by_hash(HashIndex::Email, &email_hash).await? {
            Some(existing) if existing.id != id => Err(Error::DuplicateEmail),
            _ => Ok(()),
        }
    }
}

impl<S: RecordStore> Clone for DuplicateGuard<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), hasher: self.hasher.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::tests::MockKms;
    use crate::cipher::FieldCipher;
    use crate::codec::tests::{sample_record, test_hasher};
    use crate::codec::SensitiveFieldCodec;
    use crate::store::MemoryRecordStore;

    async fn seeded(document_number: &str, email: &str) -> (Arc<MemoryRecordStore>, CustomerId) {
        let store = Arc::new(MemoryRecordStore::new());
        let codec = SensitiveFieldCodec::new(
            FieldCipher::new(MockKms::new(), Some("k".to_string())),
            test_hasher(),
            "customers",
        );
        let plain = sample_record(document_number, email);
        store.put(codec.encode(&plain).await.unwrap()).await.unwrap();
        (store, plain.id)
    }

    #[tokio::test]
    async fn test_no_conflict() {
        let (store, _) = seeded("12345678900", "jane@example.com").await;
        let guard = DuplicateGuard::new(store, test_hasher());
        guard.check("98765432100", "john@example.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_document_number_any_formatting() {
        let (store, _) = seeded("12345678900", "jane@example.com").await;
        let guard = DuplicateGuard::new(store, test_hasher());

        for variant in ["12345678900", "123.456.789-00", " 123 456 789 00 "] {
            let result = guard.check(variant, "other@example.com").await;
            assert!(matches!(result, Err(Error::DuplicateDocumentNumber)), "{variant}");
        }
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (store, _) = seeded("12345678900", "jane@example.com").await;
        let guard = DuplicateGuard::new(store, test_hasher());

        let result = guard.check("98765432100", "Jane@Example.com").await;
        assert!(matches!(result, Err(Error::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_document_number_takes_precedence() {
        let (store, _) = seeded("12345678900", "jane@example.com").await;
        let guard = DuplicateGuard::new(store, test_hasher());

        let result = guard.check("123.456.789-00", "jane@example.com").await;
        assert!(matches!(result, Err(Error::DuplicateDocumentNumber)));
    }

    #[tokio::test]
    async fn test_check_record_uses_stored_projections() {
        let (store, _) = seeded("12345678900", "jane@example.com").await;
        let guard = DuplicateGuard::new(Arc::clone(&store), test_hasher());
        let codec = SensitiveFieldCodec::new(
            FieldCipher::new(MockKms::new(), Some("k".to_string())),
            test_hasher(),
            "customers",
        );

        let fresh = codec.encode(&sample_record("98765432100", "john@example.com")).await.unwrap();
        guard.check_record(&fresh).await.unwrap();

        let clash = codec.encode(&sample_record("98765432100", "JANE@example.com")).await.unwrap();
        assert!(matches!(guard.check_record(&clash).await, Err(Error::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_empty_candidate_is_invalid() {
        let (store, _) = seeded("12345678900", "jane@example.com").await;
        let guard = DuplicateGuard::new(store, test_hasher());

        assert!(matches!(guard.check("", "x@example.com").await, Err(Error::InvalidInput(_))));
        assert!(matches!(guard.check("12345678901", " ").await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_update_own_email_is_not_conflict() {
        let (store, id) = seeded("12345678900", "jane@example.com").await;
        let guard = DuplicateGuard::new(store, test_hasher());

        guard.check_email_for(id, "jane@example.com").await.unwrap();
        let other = guard.check_email_for(CustomerId::generate(), "jane@example.com").await;
        assert!(matches!(other, Err(Error::DuplicateEmail)));
    }
}
