//! PostgreSQL inventory repository
//!
//! One row per terminal keyed on `(company_id, terminal_id)`. The table is
//! created on first write when it does not exist yet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::warn;

use crate::error::{InventoryError, Result};
use crate::model::{
    HardwareSnapshot, HostStatus, IdentityKey, InventoryRecord, Target, NOT_DETECTED,
    OPERATION_KEY, SEGMENT_KEY,
};
use crate::reconcile::{BatchOutcome, InventoryRepository};

/// Table used when none is configured
pub const DEFAULT_TABLE: &str = "terminal_inventory";

const ROW_SAVEPOINT: &str = "inventory_row";
const UNDEFINED_TABLE: &str = "42P01";

const COLUMNS: &str = "company_id, terminal_id, ip, status, segment, operation, motherboard, \
    processor, cores_threads, ram, disk_type, disk_capacity, os_release, kernel, \
    first_seen_at, last_updated_at, last_changed_at";

#[derive(Debug, sqlx::FromRow)]
struct InventoryRow {
    company_id: i64,
    terminal_id: i64,
    ip: String,
    status: String,
    segment: Option<String>,
    operation: Option<String>,
    motherboard: Option<String>,
    processor: Option<String>,
    cores_threads: Option<String>,
    ram: Option<String>,
    disk_type: Option<String>,
    disk_capacity: Option<String>,
    os_release: Option<String>,
    kernel: Option<String>,
    first_seen_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
    last_changed_at: DateTime<Utc>,
}

fn or_placeholder(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| NOT_DETECTED.to_string())
}

impl InventoryRow {
    fn into_record(self) -> InventoryRecord {
        let mut target = Target::new(self.ip).with_terminal(self.company_id, self.terminal_id);
        for (key, value) in [(SEGMENT_KEY, self.segment), (OPERATION_KEY, self.operation)] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                target = target.with_meta(key, value);
            }
        }

        InventoryRecord {
            target,
            hardware: HardwareSnapshot {
                motherboard: or_placeholder(self.motherboard),
                processor: or_placeholder(self.processor),
                cores_threads: or_placeholder(self.cores_threads),
                ram: or_placeholder(self.ram),
                disk_type: or_placeholder(self.disk_type),
                disk_capacity: or_placeholder(self.disk_capacity),
                os_release: or_placeholder(self.os_release),
                kernel: or_placeholder(self.kernel),
            },
            status: self.status.parse().unwrap_or(HostStatus::Offline),
            collection: None,
            first_seen_at: self.first_seen_at,
            last_updated_at: self.last_updated_at,
            last_changed_at: self.last_changed_at,
        }
    }
}

fn is_undefined_table(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE))
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table.len() <= 63
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(InventoryError::StorageError(format!(
            "invalid table name: {table:?}"
        )))
    }
}

/// Split terminal keys into parallel id arrays for `UNNEST`
fn split_terminal_keys(keys: &[IdentityKey]) -> (Vec<i64>, Vec<i64>) {
    keys.iter()
        .filter_map(|key| match key {
            IdentityKey::Terminal {
                company_id,
                terminal_id,
            } => Some((*company_id, *terminal_id)),
            IdentityKey::Ip(_) => None,
        })
        .unzip()
}

/// PostgreSQL repository, one row per `(company_id, terminal_id)`
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
    table: String,
}

impl PgRepository {
    /// Open a pool against `database_url`
    pub async fn connect(database_url: &str, max_connections: u32, table: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;
        Self::new(pool, table)
    }

    pub fn new(pool: PgPool, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn create_table_sql(&self) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                company_id      BIGINT      NOT NULL,
                terminal_id     BIGINT      NOT NULL,
                ip              TEXT        NOT NULL,
                status          TEXT        NOT NULL,
                segment         TEXT,
                operation       TEXT,
                motherboard     TEXT,
                processor       TEXT,
                cores_threads   TEXT,
                ram             TEXT,
                disk_type       TEXT,
                disk_capacity   TEXT,
                os_release      TEXT,
                kernel          TEXT,
                first_seen_at   TIMESTAMPTZ NOT NULL,
                last_updated_at TIMESTAMPTZ NOT NULL,
                last_changed_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (company_id, terminal_id)
            )
            "#,
            table = self.table
        )
    }

    fn upsert_sql(&self) -> String {
        format!(
            r#"
            INSERT INTO {table} ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (company_id, terminal_id) DO UPDATE SET
                ip = EXCLUDED.ip,
                status = EXCLUDED.status,
                segment = EXCLUDED.segment,
                operation = EXCLUDED.operation,
                motherboard = EXCLUDED.motherboard,
                processor = EXCLUDED.processor,
                cores_threads = EXCLUDED.cores_threads,
                ram = EXCLUDED.ram,
                disk_type = EXCLUDED.disk_type,
                disk_capacity = EXCLUDED.disk_capacity,
                os_release = EXCLUDED.os_release,
                kernel = EXCLUDED.kernel,
                last_updated_at = EXCLUDED.last_updated_at,
                last_changed_at = EXCLUDED.last_changed_at
            "#,
            table = self.table
        )
    }

    async fn upsert_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sql: &str,
        company_id: i64,
        terminal_id: i64,
        record: &InventoryRecord,
    ) -> std::result::Result<u64, sqlx::Error> {
        let hw = &record.hardware;
        let done = sqlx::query(sql)
            .bind(company_id)
            .bind(terminal_id)
            .bind(&record.target.ip)
            .bind(record.status.as_str())
            .bind(record.target.segment())
            .bind(record.target.operation())
            .bind(&hw.motherboard)
            .bind(&hw.processor)
            .bind(&hw.cores_threads)
            .bind(&hw.ram)
            .bind(&hw.disk_type)
            .bind(&hw.disk_capacity)
            .bind(&hw.os_release)
            .bind(&hw.kernel)
            .bind(record.first_seen_at)
            .bind(record.last_updated_at)
            .bind(record.last_changed_at)
            .execute(&mut **tx)
            .await?;
        Ok(done.rows_affected())
    }

    /// Upsert one row, creating the table and retrying once if it is missing
    async fn write_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sql: &str,
        company_id: i64,
        terminal_id: i64,
        record: &InventoryRecord,
    ) -> std::result::Result<u64, sqlx::Error> {
        match self.upsert_row(tx, sql, company_id, terminal_id, record).await {
            Err(e) if is_undefined_table(&e) => {
                warn!(table = %self.table, "Inventory table missing, creating it");
                sqlx::query(&format!("ROLLBACK TO SAVEPOINT {ROW_SAVEPOINT}"))
                    .execute(&mut **tx)
                    .await?;
                sqlx::query(&self.create_table_sql())
                    .execute(&mut **tx)
                    .await?;
                self.upsert_row(tx, sql, company_id, terminal_id, record)
                    .await
            }
            other => other,
        }
    }
}

#[async_trait]
impl InventoryRepository for PgRepository {
    #[tracing::instrument(skip(self, keys), fields(table = %self.table, keys = keys.len()))]
    async fn load_existing(
        &self,
        keys: &[IdentityKey],
    ) -> Result<HashMap<IdentityKey, InventoryRecord>> {
        let (company_ids, terminal_ids) = split_terminal_keys(keys);
        if company_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM {table}
            WHERE (company_id, terminal_id) IN (
                SELECT * FROM UNNEST($1::bigint[], $2::bigint[])
            )
            "#,
            table = self.table
        );

        let rows = match sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(&company_ids)
            .bind(&terminal_ids)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) if is_undefined_table(&e) => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(rows
            .into_iter()
            .map(InventoryRow::into_record)
            .map(|record| (record.identity(), record))
            .collect())
    }

    #[tracing::instrument(skip(self, records), fields(table = %self.table, rows = records.len()))]
    async fn upsert_batch(&self, records: &[InventoryRecord]) -> Result<BatchOutcome> {
        let sql = self.upsert_sql();
        let savepoint = format!("SAVEPOINT {ROW_SAVEPOINT}");
        let release = format!("RELEASE SAVEPOINT {ROW_SAVEPOINT}");
        let rollback = format!("ROLLBACK TO SAVEPOINT {ROW_SAVEPOINT}");

        let mut outcome = BatchOutcome {
            batch_size: records.len(),
            ..Default::default()
        };
        let mut tx = self.pool.begin().await?;

        for record in records {
            let (Some(company_id), Some(terminal_id)) =
                (record.target.company_id, record.target.terminal_id)
            else {
                outcome.failed.push((
                    record.identity(),
                    "missing company or terminal id".to_string(),
                ));
                continue;
            };

            sqlx::query(&savepoint).execute(&mut *tx).await?;
            match self
                .write_row(&mut tx, &sql, company_id, terminal_id, record)
                .await
            {
                Ok(affected) => {
                    sqlx::query(&release).execute(&mut *tx).await?;
                    outcome.affected += affected as usize;
                }
                Err(e) => {
                    sqlx::query(&rollback).execute(&mut *tx).await?;
                    outcome.failed.push((record.identity(), e.to_string()));
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn active_identities(&self) -> Result<HashSet<IdentityKey>> {
        let sql = format!(
            "SELECT company_id, terminal_id FROM {table} WHERE status <> $1",
            table = self.table
        );
        let rows = match sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(HostStatus::Inactive.as_str())
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) if is_undefined_table(&e) => return Ok(HashSet::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(rows
            .into_iter()
            .map(|(company_id, terminal_id)| IdentityKey::Terminal {
                company_id,
                terminal_id,
            })
            .collect())
    }

    #[tracing::instrument(skip(self, keys), fields(table = %self.table, keys = keys.len()))]
    async fn mark_inactive(&self, keys: &[IdentityKey], at: DateTime<Utc>) -> Result<usize> {
        let (company_ids, terminal_ids) = split_terminal_keys(keys);
        if company_ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            r#"
            UPDATE {table}
            SET status = $3, last_updated_at = $4
            WHERE status <> $3
              AND (company_id, terminal_id) IN (
                  SELECT * FROM UNNEST($1::bigint[], $2::bigint[])
              )
            "#,
            table = self.table
        );
        let done = sqlx::query(&sql)
            .bind(&company_ids)
            .bind(&terminal_ids)
            .bind(HostStatus::Inactive.as_str())
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(done.rows_affected() as usize)
    }

    fn requires_terminal_identity(&self) -> bool {
        true
    }
}
