//! Customer record types: the plaintext view callers work with and the
//! at-rest view that is persisted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cipher::Ciphertext;
use crate::context::FieldContext;
use crate::hashing::Digest;

/// Primary key of a customer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(Uuid);

impl CustomerId {
    /// Generates a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns `true` for the all-zero UUID, which is never assigned.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CustomerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Postal address. Every component is sensitive.
#[derive(Clone, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub house_number: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// A customer as seen by callers.
#[derive(Clone, PartialEq, Eq)]
pub struct PlaintextRecord {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub document_number: String,
    pub date_of_birth: NaiveDate,
    pub email: String,
    pub phone_number: String,
    pub address: Address,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Sensitive fields stay out of logs and panic messages.
impl fmt::Debug for PlaintextRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaintextRecord")
            .field("id", &self.id)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("date_of_birth", &self.date_of_birth)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Address([REDACTED])")
    }
}

/// The persisted form of a customer.
///
/// Field names follow the stored layout, so any store that serializes
/// through serde writes the same attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtRestRecord {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub document_number_ciphertext: Ciphertext,
    pub document_number_hash: Digest,
    pub date_of_birth: NaiveDate,
    pub email_ciphertext: Ciphertext,
    pub email_hash: Digest,
    pub phone_number_ciphertext: Ciphertext,
    pub street_ciphertext: Ciphertext,
    pub house_number_ciphertext: Ciphertext,
    pub city_ciphertext: Ciphertext,
    pub state_ciphertext: Ciphertext,
    pub postal_code_ciphertext: Ciphertext,
    pub country_ciphertext: Ciphertext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AtRestRecord {
    /// Returns the digest stored for the given index.
    #[must_use]
    pub const fn hash_for(&self, index: HashIndex) -> &Digest {
        match index {
            HashIndex::DocumentNumber => &self.document_number_hash,
            HashIndex::Email => &self.email_hash,
        }
    }
}

/// Fields stored as ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensitiveField {
    DocumentNumber,
    Email,
    PhoneNumber,
    Street,
    HouseNumber,
    City,
    State,
    PostalCode,
    Country,
}

impl SensitiveField {
    /// Every sensitive field, in encoding order.
    pub const ALL: [Self; 9] = [
        Self::DocumentNumber,
        Self::Email,
        Self::PhoneNumber,
        Self::Street,
        Self::HouseNumber,
        Self::City,
        Self::State,
        Self::PostalCode,
        Self::Country,
    ];

    /// Logical column name, without the `Ciphertext` suffix.
    #[must_use]
    pub const fn column_name(self) -> &'static str {
        match self {
            Self::DocumentNumber => "documentNumber",
            Self::Email => "email",
            Self::PhoneNumber => "phoneNumber",
            Self::Street => "street",
            Self::HouseNumber => "houseNumber",
            Self::City => "city",
            Self::State => "state",
            Self::PostalCode => "postalCode",
            Self::Country => "country",
        }
    }

    /// Builds the oracle context for this field in `table_name`.
    #[must_use]
    pub fn context(self, table_name: &str) -> FieldContext {
        FieldContext::new(table_name, self.column_name())
    }
}

impl fmt::Display for SensitiveField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// The two secondary indexes over hash projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashIndex {
    DocumentNumber,
    Email,
}

impl HashIndex {
    /// Name of the index in the backing store.
    #[must_use]
    pub const fn index_name(self) -> &'static str {
        match self {
            Self::DocumentNumber => "DocumentNumberHash-index",
            Self::Email => "EmailHash-index",
        }
    }

    /// Name of the hashed attribute.
    #[must_use]
    pub const fn attribute(self) -> &'static str {
        match self {
            Self::DocumentNumber => "documentNumberHash",
            Self::Email => "emailHash",
        }
    }
}

impl fmt::Display for HashIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_id_parse_display() {
        let id = CustomerId::generate();
        let parsed: CustomerId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(!id.is_nil());
    }

    #[test]
    fn test_sensitive_field_columns_are_unique() {
        let mut names: Vec<_> = SensitiveField::ALL.iter().map(|f| f.column_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SensitiveField::ALL.len());
    }

    #[test]
    fn test_hash_index_names() {
        assert_eq!(HashIndex::DocumentNumber.index_name(), "DocumentNumberHash-index");
        assert_eq!(HashIndex::Email.attribute(), "emailHash");
    }

    #[test]
    fn test_plaintext_debug_redacts_pii() {
        let record = PlaintextRecord {
            id: CustomerId::generate(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            document_number: "98765432100".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            email: "jane@example.com".to_string(),
            phone_number: "11987654321".to_string(),
            address: Address {
                street: "Rua das Flores".to_string(),
                house_number: "42".to_string(),
                city: "São Paulo".to_string(),
                state: "SP".to_string(),
                postal_code: "01310100".to_string(),
                country: "Brazil".to_string(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let rendered = format!("{record:?}");
        assert!(rendered.contains("Jane"));
        assert!(!rendered.contains("98765432100"));
        assert!(!rendered.contains("jane@example.com"));
        assert!(!rendered.contains("Rua das Flores"));
    }
}
