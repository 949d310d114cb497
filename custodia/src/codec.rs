//! Whole-record encoding between plaintext and at-rest form.
//!
//! Encoding encrypts each of the nine sensitive fields and adds the two
//! hash projections; decoding decrypts the same nine fields. Both are
//! all-or-nothing: the per-field oracle calls run concurrently and the
//! first failure aborts the whole record.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::cipher::{Ciphertext, FieldCipher};
use crate::config::Settings;
use crate::error::Error;
use crate::hashing::HashingService;
use crate::kms::KeyManagementClient;
use crate::record::{Address, AtRestRecord, HashIndex, PlaintextRecord, SensitiveField};

/// Converts records between plaintext and at-rest form.
pub struct SensitiveFieldCodec<K: KeyManagementClient> {
    cipher: FieldCipher<K>,
    hasher: HashingService,
    table_name: String,
    decode_concurrency: usize,
}

impl<K: KeyManagementClient> SensitiveFieldCodec<K> {
    /// Creates a codec writing ciphertext bound to `table_name`.
    pub fn new(cipher: FieldCipher<K>, hasher: HashingService, table_name: impl Into<String>) -> Self {
        Self {
            cipher,
            hasher,
            table_name: table_name.into(),
            decode_concurrency: crate::config::DEFAULT_DECODE_CONCURRENCY,
        }
    }

    /// Creates a codec from loaded settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configured salt is unusable.
    pub fn from_settings(client: Arc<K>, settings: &Settings) -> Result<Self, Error> {
        let cipher = FieldCipher::from_settings(client, settings);
        let hasher = HashingService::from_settings(settings)?;
        Ok(Self::new(cipher, hasher, settings.table_name())
            .with_decode_concurrency(settings.decode_concurrency()))
    }

    /// Sets how many records `decode_all` decodes at once.
    #[must_use]
    pub fn with_decode_concurrency(mut self, limit: usize) -> Self {
        self.decode_concurrency = limit.max(1);
        self
    }

    /// Returns the hashing service used for projections.
    #[must_use]
    pub const fn hasher(&self) -> &HashingService {
        &self.hasher
    }

    /// Encodes a plaintext record for storage.
    ///
    /// Hash projections are computed from the plaintext before any oracle
    /// call is made.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the document number or email cannot
    /// be hashed, or the first field-encryption error.
    pub async fn encode(&self, plain: &PlaintextRecord) -> Result<AtRestRecord, Error> {
        let document_number_hash =
            self.hasher.index_key(HashIndex::DocumentNumber, &plain.document_number)?;
        let email_hash = self.hasher.index_key(HashIndex::Email, &plain.email)?;

        let address = &plain.address;
        let (
            document_number_ciphertext,
            email_ciphertext,
            phone_number_ciphertext,
            street_ciphertext,
            house_number_ciphertext,
            city_ciphertext,
            state_ciphertext,
            postal_code_ciphertext,
            country_ciphertext,
        ) = futures::try_join!(
            self.seal(SensitiveField::DocumentNumber, &plain.document_number),
            self.seal(SensitiveField::Email, &plain.email),
            self.seal(SensitiveField::PhoneNumber, &plain.phone_number),
            self.seal(SensitiveField::Street, &address.street),
            self.seal(SensitiveField::HouseNumber, &address.house_number),
            self.seal(SensitiveField::City, &address.city),
            self.seal(SensitiveField::State, &address.state),
            self.seal(SensitiveField::PostalCode, &address.postal_code),
            self.seal(SensitiveField::Country, &address.country),
        )?;

        Ok(AtRestRecord {
            id: plain.id,
            first_name: plain.first_name.clone(),
            last_name: plain.last_name.clone(),
            document_number_ciphertext,
            document_number_hash,
            date_of_birth: plain.date_of_birth,
            email_ciphertext,
            email_hash,
            phone_number_ciphertext,
            street_ciphertext,
            house_number_ciphertext,
            city_ciphertext,
            state_ciphertext,
            postal_code_ciphertext,
            country_ciphertext,
            created_at: plain.created_at,
            updated_at: plain.updated_at,
        })
    }

    /// Decodes a stored record.
    ///
    /// Hash projections are ignored.
    ///
    /// # Errors
    ///
    /// Returns the first field-decryption error.
    pub async fn decode(&self, at_rest: &AtRestRecord) -> Result<PlaintextRecord, Error> {
        let (document_number, email, phone_number, street, house_number, city, state, postal_code, country) =
            futures::try_join!(
                self.open(SensitiveField::DocumentNumber, &at_rest.document_number_ciphertext),
                self.open(SensitiveField::Email, &at_rest.email_ciphertext),
                self.open(SensitiveField::PhoneNumber, &at_rest.phone_number_ciphertext),
                self.open(SensitiveField::Street, &at_rest.street_ciphertext),
                self.open(SensitiveField::HouseNumber, &at_rest.house_number_ciphertext),
                self.open(SensitiveField::City, &at_rest.city_ciphertext),
                self.open(SensitiveField::State, &at_rest.state_ciphertext),
                self.open(SensitiveField::PostalCode, &at_rest.postal_code_ciphertext),
                self.open(SensitiveField::Country, &at_rest.country_ciphertext),
            )?;

        Ok(PlaintextRecord {
            id: at_rest.id,
            first_name: at_rest.first_name.clone(),
            last_name: at_rest.last_name.clone(),
            document_number,
            date_of_birth: at_rest.date_of_birth,
            email,
            phone_number,
            address: Address { street, house_number, city, state, postal_code, country },
            created_at: at_rest.created_at,
            updated_at: at_rest.updated_at,
        })
    }

    /// Decodes many records, at most `decode_concurrency` at a time.
    ///
    /// Output order matches input order. Any failure fails the batch.
    ///
    /// # Errors
    ///
    /// Returns the first record-decoding error.
    pub async fn decode_all(&self, records: Vec<AtRestRecord>) -> Result<Vec<PlaintextRecord>, Error> {
        stream::iter(records)
            .map(|record| async move { self.decode(&record).await })
            .buffered(self.decode_concurrency)
            .try_collect()
            .await
    }

    async fn seal(&self, field: SensitiveField, value: &str) -> Result<Ciphertext, Error> {
        self.cipher.encrypt(value, &field.context(&self.table_name)).await.map_err(|e| {
            tracing::warn!(field = %field, error = %e, "field encryption failed");
            e
        })
    }

    async fn open(&self, field: SensitiveField, token: &Ciphertext) -> Result<String, Error> {
        self.cipher.decrypt(token, &field.context(&self.table_name)).await.map_err(|e| {
            tracing::warn!(field = %field, error = %e, "field decryption failed");
            e
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cipher::tests::MockKms;
    use crate::record::CustomerId;
    use chrono::{NaiveDate, Utc};
    use proptest::prelude::*;
    use secrecy::SecretVec;

    pub(crate) fn sample_record(document_number: &str, email: &str) -> PlaintextRecord {
        let now = Utc::now();
        PlaintextRecord {
            id: CustomerId::generate(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            document_number: document_number.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1985, 5, 20).unwrap(),
            email: email.to_string(),
            phone_number: "11987654321".to_string(),
            address: Address {
                street: "Avenida Paulista".to_string(),
                house_number: "1578".to_string(),
                city: "São Paulo".to_string(),
                state: "SP".to_string(),
                postal_code: "01310200".to_string(),
                country: "Brazil".to_string(),
            },
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn test_hasher() -> HashingService {
        HashingService::new(SecretVec::new(b"test-salt".to_vec())).unwrap()
    }

    fn codec_with(kms: MockKms) -> SensitiveFieldCodec<MockKms> {
        let cipher = FieldCipher::new(kms, Some("alias/customers".to_string()));
        SensitiveFieldCodec::new(cipher, test_hasher(), "customers")
    }

    #[tokio::test]
    async fn test_encode_decode_scenario() {
        let codec = codec_with(MockKms::new());
        let plain = sample_record("98765432100", "jane@example.com");

        let at_rest = codec.encode(&plain).await.unwrap();

        assert!(!at_rest.document_number_hash.as_str().is_empty());
        assert_eq!(at_rest.document_number_hash, codec.hasher().hash("98765432100").unwrap());
        assert_eq!(at_rest.email_hash, codec.hasher().hash("jane@example.com").unwrap());
        assert_ne!(at_rest.document_number_ciphertext.as_str(), "98765432100");
        assert_ne!(at_rest.email_ciphertext.as_str(), "jane@example.com");
        assert_ne!(at_rest.street_ciphertext.as_str(), plain.address.street);

        let decoded = codec.decode(&at_rest).await.unwrap();
        assert_eq!(decoded.document_number, "98765432100");
        assert_eq!(decoded.email, "jane@example.com");
        assert_eq!(decoded, plain);
    }

    #[tokio::test]
    async fn test_encode_makes_one_call_per_sensitive_field() {
        let codec = codec_with(MockKms::new());
        codec.encode(&sample_record("98765432100", "jane@example.com")).await.unwrap();
        assert_eq!(codec.cipher.client_calls(), SensitiveField::ALL.len());
    }

    #[tokio::test]
    async fn test_reencode_changes_ciphertext_not_hashes() {
        let codec = codec_with(MockKms::new());
        let plain = sample_record("98765432100", "jane@example.com");

        let first = codec.encode(&plain).await.unwrap();
        let second = codec.encode(&plain).await.unwrap();

        assert_ne!(first.document_number_ciphertext, second.document_number_ciphertext);
        assert_ne!(first.email_ciphertext, second.email_ciphertext);
        assert_eq!(first.document_number_hash, second.document_number_hash);
        assert_eq!(first.email_hash, second.email_hash);
    }

    #[tokio::test]
    async fn test_encode_fails_whole_record_on_third_field() {
        let codec = codec_with(MockKms::failing_on(3));
        let result = codec.encode(&sample_record("98765432100", "jane@example.com")).await;
        assert!(matches!(result, Err(Error::RemoteService(_))));
    }

    #[tokio::test]
    async fn test_encode_rejects_blank_email_before_any_oracle_call() {
        let codec = codec_with(MockKms::new());
        let result = codec.encode(&sample_record("98765432100", "  ")).await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(codec.cipher.client_calls(), 0);
    }

    #[tokio::test]
    async fn test_encode_without_key_fails() {
        let cipher = FieldCipher::new(MockKms::new(), None);
        let codec = SensitiveFieldCodec::new(cipher, test_hasher(), "customers");

        let result = codec.encode(&sample_record("98765432100", "jane@example.com")).await;
        assert!(matches!(result, Err(Error::KeyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_decode_fails_on_single_corrupt_field() {
        let codec = codec_with(MockKms::new());
        let mut at_rest = codec.encode(&sample_record("98765432100", "jane@example.com")).await.unwrap();
        at_rest.city_ciphertext = Ciphertext::from_token("%%%");

        let result = codec.decode(&at_rest).await;
        assert!(matches!(result, Err(Error::MalformedCiphertext(_))));
    }

    #[tokio::test]
    async fn test_decode_rejects_swapped_columns() {
        let codec = codec_with(MockKms::new());
        let mut at_rest = codec.encode(&sample_record("98765432100", "jane@example.com")).await.unwrap();
        std::mem::swap(&mut at_rest.email_ciphertext, &mut at_rest.phone_number_ciphertext);

        assert!(codec.decode(&at_rest).await.is_err());
    }

    #[tokio::test]
    async fn test_decode_ignores_hash_fields() {
        let codec = codec_with(MockKms::new());
        let plain = sample_record("98765432100", "jane@example.com");
        let mut at_rest = codec.encode(&plain).await.unwrap();
        at_rest.email_hash = crate::hashing::Digest::from_encoded("garbage");

        assert_eq!(codec.decode(&at_rest).await.unwrap(), plain);
    }

    #[tokio::test]
    async fn test_decode_all_preserves_order() {
        let codec = codec_with(MockKms::new()).with_decode_concurrency(2);
        let mut encoded = Vec::new();
        let mut ids = Vec::new();
        for i in 0..6 {
            let plain = sample_record(&format!("1234567890{i}"), &format!("user{i}@example.com"));
            ids.push(plain.id);
            encoded.push(codec.encode(&plain).await.unwrap());
        }

        let decoded = codec.decode_all(encoded).await.unwrap();
        assert_eq!(decoded.iter().map(|r| r.id).collect::<Vec<_>>(), ids);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            street in "\\PC{0,40}",
            city in "\\PC{0,40}",
            phone in "[0-9() +-]{0,15}",
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let codec = codec_with(MockKms::new());
            let mut plain = sample_record("98765432100", "jane@example.com");
            plain.address.street = street;
            plain.address.city = city;
            plain.phone_number = phone;

            let decoded = runtime.block_on(async {
                let at_rest = codec.encode(&plain).await.unwrap();
                codec.decode(&at_rest).await.unwrap()
            });
            prop_assert_eq!(decoded, plain);
        }
    }
}
