//! In-process inventory repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{HostStatus, IdentityKey, InventoryRecord};
use crate::reconcile::{BatchOutcome, InventoryRepository};

/// In-process repository keyed on [`IdentityKey`].
///
/// Behaves like the database table: `first_seen_at` of an existing row is
/// never overwritten and the per-pass collection status is not kept.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<IdentityKey, InventoryRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the repository with existing records
    pub fn with_records(records: impl IntoIterator<Item = InventoryRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.identity(), record))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn get(&self, key: &IdentityKey) -> Option<InventoryRecord> {
        self.records.read().await.get(key).cloned()
    }

    /// All records, ordered by identity
    pub async fn records(&self) -> Vec<InventoryRecord> {
        let records = self.records.read().await;
        let mut all: Vec<InventoryRecord> = records.values().cloned().collect();
        all.sort_by_key(InventoryRecord::identity);
        all
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl InventoryRepository for MemoryRepository {
    async fn load_existing(
        &self,
        keys: &[IdentityKey],
    ) -> Result<HashMap<IdentityKey, InventoryRecord>> {
        let records = self.records.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| records.get(key).map(|r| (key.clone(), r.clone())))
            .collect())
    }

    async fn upsert_batch(&self, batch: &[InventoryRecord]) -> Result<BatchOutcome> {
        let mut records = self.records.write().await;
        for record in batch {
            let mut row = record.clone();
            row.collection = None;
            if let Some(existing) = records.get(&row.identity()) {
                row.first_seen_at = existing.first_seen_at;
            }
            records.insert(row.identity(), row);
        }

        Ok(BatchOutcome {
            affected: batch.len(),
            batch_size: batch.len(),
            failed: Vec::new(),
        })
    }

    async fn active_identities(&self) -> Result<HashSet<IdentityKey>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|(_, r)| r.status != HostStatus::Inactive)
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn mark_inactive(&self, keys: &[IdentityKey], at: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write().await;
        let mut marked = 0;
        for key in keys {
            if let Some(record) = records.get_mut(key) {
                if record.status != HostStatus::Inactive {
                    record.status = HostStatus::Inactive;
                    record.last_updated_at = at;
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }
}
