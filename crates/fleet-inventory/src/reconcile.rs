//! Reconciliation of collected results against persisted inventory
//!
//! Runs strictly after the concurrent collection phase. Existing records are
//! read in one bulk call, merged with the new results, and written back in
//! fixed-size batches through an [`InventoryRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{InventoryError, Result};
use crate::model::{HardwareSnapshot, HostResult, HostStatus, IdentityKey, InventoryRecord, Target};

/// Result of one `upsert_batch` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows inserted or updated
    pub affected: usize,
    /// Rows handed to the batch
    pub batch_size: usize,
    /// Rows the store rejected, with the reason
    pub failed: Vec<(IdentityKey, String)>,
}

/// Persistence backend for inventory records
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Bulk read of the records matching `keys`; missing keys are absent from the map
    async fn load_existing(
        &self,
        keys: &[IdentityKey],
    ) -> Result<HashMap<IdentityKey, InventoryRecord>>;

    /// Update-or-insert by identity.
    ///
    /// A row failure lands in [`BatchOutcome::failed`] and the other rows are
    /// still applied. `Err` means the whole batch was rolled back.
    async fn upsert_batch(&self, records: &[InventoryRecord]) -> Result<BatchOutcome>;

    /// Identities of every persisted record not yet inactive
    async fn active_identities(&self) -> Result<HashSet<IdentityKey>>;

    /// Mark `keys` inactive at `at`, returning the rows changed
    async fn mark_inactive(&self, keys: &[IdentityKey], at: DateTime<Utc>) -> Result<usize>;

    /// Whether records must carry company and terminal numbers
    fn requires_terminal_identity(&self) -> bool {
        false
    }
}

fn same(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn differs(target: &Target, hardware: &HardwareSnapshot, prior: &InventoryRecord) -> bool {
    let identity_same = same(&target.ip, &prior.target.ip)
        && same(target.segment(), prior.target.segment())
        && same(target.operation(), prior.target.operation());

    let hardware_same = hardware
        .fields()
        .iter()
        .zip(prior.hardware.fields().iter())
        .all(|(a, b)| same(a, b));

    !(identity_same && hardware_same)
}

/// Whether a fresh result differs from its persisted record.
///
/// Compares the address, segment, operation and every hardware field after
/// trimming, ignoring case. No prior record always counts as a change.
#[must_use]
pub fn has_changes(new: &HostResult, prior: Option<&InventoryRecord>) -> bool {
    prior.map_or(true, |prior| differs(&new.target, &new.snapshot, prior))
}

/// Build the record to persist for `new`.
///
/// An offline host keeps the prior hardware. `first_seen_at` never moves
/// once set; `last_changed_at` moves only when the merged record differs.
#[must_use]
pub fn merge_record(
    new: &HostResult,
    prior: Option<&InventoryRecord>,
    now: DateTime<Utc>,
) -> InventoryRecord {
    let status = new.status.host_status();
    let hardware = match (status, prior) {
        (HostStatus::Offline, Some(prior)) => prior.hardware.clone(),
        _ => new.snapshot.clone().normalized(),
    };

    let changed = prior.map_or(true, |prior| differs(&new.target, &hardware, prior));

    InventoryRecord {
        target: new.target.clone(),
        hardware,
        status,
        collection: Some(new.status),
        first_seen_at: prior.map_or(now, |p| p.first_seen_at),
        last_updated_at: now,
        last_changed_at: match prior {
            Some(prior) if !changed => prior.last_changed_at,
            _ => now,
        },
    }
}

/// Reconciliation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Records per upsert batch
    pub batch_size: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { batch_size: 20 }
    }
}

/// Counts from one `persist` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub written: usize,
    /// Written records whose identity and hardware were unchanged
    pub unchanged: usize,
    pub failed_rows: usize,
    pub failed_batches: usize,
}

/// Reconciles results with an [`InventoryRepository`]
pub struct ReconciliationStore<R: InventoryRepository> {
    repository: R,
    options: ReconcileOptions,
}

impl<R: InventoryRepository> ReconciliationStore<R> {
    pub fn new(repository: R, options: ReconcileOptions) -> Self {
        Self {
            repository,
            options,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// One bulk read of the prior records for `keys`
    pub async fn load_existing(
        &self,
        keys: &[IdentityKey],
    ) -> Result<HashMap<IdentityKey, InventoryRecord>> {
        let mut unique: Vec<IdentityKey> = keys.to_vec();
        unique.sort();
        unique.dedup();
        self.repository.load_existing(&unique).await
    }

    /// Merge `results` with the stored records and write them back in batches.
    ///
    /// When the repository is keyed on terminal numbers, every result must
    /// carry both of them; otherwise nothing is written and
    /// [`InventoryError::MissingIdentity`] is returned.
    pub async fn persist(&self, results: &[HostResult]) -> Result<ReconcileSummary> {
        if self.repository.requires_terminal_identity() {
            if let Some(result) = results.iter().find(|r| !r.target.has_terminal_identity()) {
                return Err(InventoryError::MissingIdentity {
                    ip: result.target.ip.clone(),
                });
            }
        }

        let keys: Vec<IdentityKey> = results.iter().map(|r| r.target.identity()).collect();
        let existing = self.load_existing(&keys).await?;
        let now = Utc::now();

        let mut summary = ReconcileSummary::default();
        let records: Vec<InventoryRecord> = results
            .iter()
            .map(|result| {
                let prior = existing.get(&result.target.identity());
                let record = merge_record(result, prior, now);
                if prior.is_some_and(|p| record.last_changed_at == p.last_changed_at) {
                    summary.unchanged += 1;
                }
                record
            })
            .collect();

        let batch_size = self.options.batch_size.max(1);
        for (index, batch) in records.chunks(batch_size).enumerate() {
            match self.repository.upsert_batch(batch).await {
                Ok(outcome) => {
                    debug!(
                        batch = index,
                        affected = outcome.affected,
                        batch_size = outcome.batch_size,
                        "Batch written"
                    );
                    for (key, reason) in &outcome.failed {
                        warn!(batch = index, identity = %key, reason = %reason, "Row rejected");
                    }
                    summary.written += outcome.affected;
                    summary.failed_rows += outcome.failed.len();
                }
                Err(e) => {
                    warn!(batch = index, rows = batch.len(), error = %e, "Batch rolled back");
                    summary.failed_batches += 1;
                    summary.failed_rows += batch.len();
                }
            }
        }

        info!(
            records = records.len(),
            written = summary.written,
            unchanged = summary.unchanged,
            failed_rows = summary.failed_rows,
            "Reconciliation finished"
        );
        Ok(summary)
    }

    /// Mark every persisted identity missing from `active` as inactive
    pub async fn reconcile_inactive(&self, active: &HashSet<IdentityKey>) -> Result<usize> {
        let persisted = self.repository.active_identities().await?;
        let mut stale: Vec<IdentityKey> = persisted.difference(active).cloned().collect();
        if stale.is_empty() {
            return Ok(0);
        }
        stale.sort();

        let marked = self.repository.mark_inactive(&stale, Utc::now()).await?;
        info!(marked, "Identities marked inactive");
        Ok(marked)
    }
}
