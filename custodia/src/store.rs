//! Record persistence abstraction.
//!
//! A store keeps at-rest records under their identity and maintains two
//! non-unique secondary indexes over the hash projections. Nothing in the
//! store ever sees plaintext.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::hashing::Digest;
use crate::record::{AtRestRecord, CustomerId, HashIndex};

/// Persistence for at-rest records.
///
/// `put` and `delete` are idempotent. `get_by_hash` returns the first
/// match; the indexes do not enforce uniqueness, so several records may
/// share a digest. `scan_all` is unordered and not a consistent snapshot
/// with respect to concurrent writers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts or replaces the record with the same identity.
    async fn put(&self, record: AtRestRecord) -> Result<(), StoreError>;

    /// Point lookup by identity.
    async fn get(&self, id: &CustomerId) -> Result<Option<AtRestRecord>, StoreError>;

    /// First record whose `index` projection equals `digest`.
    async fn get_by_hash(
        &self,
        index: HashIndex,
        digest: &Digest,
    ) -> Result<Option<AtRestRecord>, StoreError>;

    /// Every stored record.
    async fn scan_all(&self) -> Result<Vec<AtRestRecord>, StoreError>;

    /// Removes the record, if present.
    async fn delete(&self, id: &CustomerId) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Tables {
    records: HashMap<CustomerId, AtRestRecord>,
    // Insertion-ordered so "first match" is the oldest writer.
    by_document_number: HashMap<Digest, Vec<CustomerId>>,
    by_email: HashMap<Digest, Vec<CustomerId>>,
}

impl Tables {
    fn index(&self, index: HashIndex) -> &HashMap<Digest, Vec<CustomerId>> {
        match index {
            HashIndex::DocumentNumber => &self.by_document_number,
            HashIndex::Email => &self.by_email,
        }
    }

    fn index_mut(&mut self, index: HashIndex) -> &mut HashMap<Digest, Vec<CustomerId>> {
        match index {
            HashIndex::DocumentNumber => &mut self.by_document_number,
            HashIndex::Email => &mut self.by_email,
        }
    }

    fn link(&mut self, record: &AtRestRecord) {
        for index in [HashIndex::DocumentNumber, HashIndex::Email] {
            let digest = record.hash_for(index).clone();
            self.index_mut(index).entry(digest).or_default().push(record.id);
        }
    }

    fn unlink(&mut self, record: &AtRestRecord) {
        for index in [HashIndex::DocumentNumber, HashIndex::Email] {
            let digest = record.hash_for(index).clone();
            if let Entry::Occupied(mut entry) = self.index_mut(index).entry(digest) {
                entry.get_mut().retain(|id| *id != record.id);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }
    }
}

/// In-memory store with real secondary indexes.
///
/// Suitable for tests and local tooling; contents are lost on drop.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<Tables>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().records.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.read().records.is_empty()
    }

    /// Number of records indexed under `digest`.
    #[must_use]
    pub fn index_len(&self, index: HashIndex, digest: &Digest) -> usize {
        self.tables.read().index(index).get(digest).map_or(0, Vec::len)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(&self, record: AtRestRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if let Some(previous) = tables.records.remove(&record.id) {
            tables.unlink(&previous);
        }
        tables.link(&record);
        tracing::debug!(customer_id = %record.id, "record stored");
        tables.records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: &CustomerId) -> Result<Option<AtRestRecord>, StoreError> {
        Ok(self.tables.read().records.get(id).cloned())
    }

    async fn get_by_hash(
        &self,
        index: HashIndex,
        digest: &Digest,
    ) -> Result<Option<AtRestRecord>, StoreError> {
        let tables = self.tables.read();
        let found = tables
            .index(index)
            .get(digest)
            .and_then(|ids| ids.first())
            .and_then(|id| tables.records.get(id))
            .cloned();
        Ok(found)
    }

    async fn scan_all(&self) -> Result<Vec<AtRestRecord>, StoreError> {
        Ok(self.tables.read().records.values().cloned().collect())
    }

    async fn delete(&self, id: &CustomerId) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if let Some(previous) = tables.records.remove(id) {
            tables.unlink(&previous);
            tracing::debug!(customer_id = %id, "record deleted");
        }
        Ok(())
    }
}
