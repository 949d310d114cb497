//! DynamoDB record store for `custodia`.
//!
//! Table layout:
//! - partition key `id` (string UUID)
//! - global secondary index `DocumentNumberHash-index` on `documentNumberHash`
//! - global secondary index `EmailHash-index` on `emailHash`
//!
//! Both indexes must project all attributes. Index queries are eventually
//! consistent, so a record written moments ago may not be found by hash.

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, NaiveDate, Utc};
use custodia::cipher::Ciphertext;
use custodia::error::StoreError;
use custodia::hashing::Digest;
use custodia::record::{AtRestRecord, CustomerId, HashIndex};
use custodia::store::RecordStore;

/// A DynamoDB item.
pub type Item = HashMap<String, AttributeValue>;

const ID: &str = "id";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Record store over a single DynamoDB table.
#[derive(Clone)]
pub struct DynamoRecordStore {
    client: Client,
    table_name: String,
}

impl DynamoRecordStore {
    /// Creates a store from the default AWS configuration chain.
    pub async fn new(table_name: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::from_client(Client::new(&config), table_name)
    }

    /// Wraps an already configured SDK client.
    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self { client, table_name: table_name.into() }
    }

    /// Name of the backing table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

fn backend<E: std::error::Error>(err: E) -> StoreError {
    StoreError::Backend(DisplayErrorContext(err).to_string())
}

fn key(id: &CustomerId) -> AttributeValue {
    AttributeValue::S(id.to_string())
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn put(&self, record: AtRestRecord) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_item(&record)))
            .send()
            .await
            .map_err(backend)?;
        tracing::debug!(customer_id = %record.id, table = %self.table_name, "item written");
        Ok(())
    }

    async fn get(&self, id: &CustomerId) -> Result<Option<AtRestRecord>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ID, key(id))
            .consistent_read(true)
            .send()
            .await
            .map_err(backend)?;
        output.item().map(from_item).transpose()
    }

    async fn get_by_hash(
        &self,
        index: HashIndex,
        digest: &Digest,
    ) -> Result<Option<AtRestRecord>, StoreError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(index.index_name())
            .key_condition_expression("#hash = :hash")
            .expression_attribute_names("#hash", index.attribute())
            .expression_attribute_values(":hash", AttributeValue::S(digest.as_str().to_string()))
            .limit(1)
            .send()
            .await
            .map_err(backend)?;
        output.items().first().map(from_item).transpose()
    }

    async fn scan_all(&self) -> Result<Vec<AtRestRecord>, StoreError> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(backend)?;

            for item in output.items() {
                records.push(from_item(item)?);
            }
            match output.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }
        tracing::debug!(count = records.len(), table = %self.table_name, "table scanned");
        Ok(records)
    }

    async fn delete(&self, id: &CustomerId) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(ID, key(id))
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }
}

/// Converts a record to its item form.
#[must_use]
pub fn to_item(record: &AtRestRecord) -> Item {
    let s = |v: &str| AttributeValue::S(v.to_string());
    let attributes = [
        (ID, key(&record.id)),
        ("firstName", s(&record.first_name)),
        ("lastName", s(&record.last_name)),
        ("documentNumberCiphertext", s(record.document_number_ciphertext.as_str())),
        ("documentNumberHash", s(record.document_number_hash.as_str())),
        ("dateOfBirth", s(&record.date_of_birth.format(DATE_FORMAT).to_string())),
        ("emailCiphertext", s(record.email_ciphertext.as_str())),
        ("emailHash", s(record.email_hash.as_str())),
        ("phoneNumberCiphertext", s(record.phone_number_ciphertext.as_str())),
        ("streetCiphertext", s(record.street_ciphertext.as_str())),
        ("houseNumberCiphertext", s(record.house_number_ciphertext.as_str())),
        ("cityCiphertext", s(record.city_ciphertext.as_str())),
        ("stateCiphertext", s(record.state_ciphertext.as_str())),
        ("postalCodeCiphertext", s(record.postal_code_ciphertext.as_str())),
        ("countryCiphertext", s(record.country_ciphertext.as_str())),
        ("createdAt", s(&record.created_at.to_rfc3339())),
        ("updatedAt", s(&record.updated_at.to_rfc3339())),
    ];
    attributes.into_iter().map(|(name, value)| (name.to_string(), value)).collect()
}

struct ItemReader<'a> {
    item: &'a Item,
    id: String,
}

impl ItemReader<'_> {
    fn corrupt(&self, message: String) -> StoreError {
        StoreError::CorruptItem { id: self.id.clone(), message }
    }

    fn string(&self, name: &str) -> Result<String, StoreError> {
        match self.item.get(name) {
            Some(AttributeValue::S(value)) => Ok(value.clone()),
            Some(_) => Err(self.corrupt(format!("attribute {name} is not a string"))),
            None => Err(self.corrupt(format!("missing attribute {name}"))),
        }
    }

    fn ciphertext(&self, name: &str) -> Result<Ciphertext, StoreError> {
        self.string(name).map(Ciphertext::from_token)
    }

    fn digest(&self, name: &str) -> Result<Digest, StoreError> {
        self.string(name).map(Digest::from_encoded)
    }

    fn date(&self, name: &str) -> Result<NaiveDate, StoreError> {
        NaiveDate::parse_from_str(&self.string(name)?, DATE_FORMAT)
            .map_err(|e| self.corrupt(format!("attribute {name}: {e}")))
    }

    fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(&self.string(name)?)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| self.corrupt(format!("attribute {name}: {e}")))
    }
}

/// Reads a record from its item form.
///
/// # Errors
///
/// Returns `StoreError::CorruptItem` if an attribute is missing or has the
/// wrong type or format.
pub fn from_item(item: &Item) -> Result<AtRestRecord, StoreError> {
    let id = match item.get(ID) {
        Some(AttributeValue::S(id)) => id.clone(),
        _ => String::from("<unknown>"),
    };
    let r = ItemReader { item, id };

    Ok(AtRestRecord {
        id: r.id.parse().map_err(|e| r.corrupt(format!("attribute id: {e}")))?,
        first_name: r.string("firstName")?,
        last_name: r.string("lastName")?,
        document_number_ciphertext: r.ciphertext("documentNumberCiphertext")?,
        document_number_hash: r.digest("documentNumberHash")?,
        date_of_birth: r.date("dateOfBirth")?,
        email_ciphertext: r.ciphertext("emailCiphertext")?,
        email_hash: r.digest("emailHash")?,
        phone_number_ciphertext: r.ciphertext("phoneNumberCiphertext")?,
        street_ciphertext: r.ciphertext("streetCiphertext")?,
        house_number_ciphertext: r.ciphertext("houseNumberCiphertext")?,
        city_ciphertext: r.ciphertext("cityCiphertext")?,
        state_ciphertext: r.ciphertext("stateCiphertext")?,
        postal_code_ciphertext: r.ciphertext("postalCodeCiphertext")?,
        country_ciphertext: r.ciphertext("countryCiphertext")?,
        created_at: r.timestamp("createdAt")?,
        updated_at: r.timestamp("updatedAt")?,
    })
}
