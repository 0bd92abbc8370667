//! Spreadsheet-compatible CSV artifact
//!
//! Written when results cannot go to the database. One row per record in the
//! canonical column order, `;`-separated so spreadsheet tools in comma-decimal
//! locales open it directly.

use chrono::{DateTime, Local, Utc};
use csv::WriterBuilder;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{InventoryError, Result};
use crate::model::{HostResult, InventoryRecord};
use crate::reconcile::merge_record;

/// Canonical column set
pub const COLUMNS: [&str; 16] = [
    "IP",
    "COMPANY_ID",
    "TERMINAL_ID",
    "STATUS",
    "SEGMENT",
    "OPERATION",
    "MOTHERBOARD",
    "PROCESSOR",
    "CORES_THREADS",
    "RAM",
    "DISK_TYPE",
    "DISK_CAPACITY",
    "OS_RELEASE",
    "KERNEL",
    "FIRST_SEEN_AT",
    "LAST_UPDATED_AT",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DELIMITER: u8 = b';';

fn timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

fn row(record: &InventoryRecord) -> Vec<String> {
    let id = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();
    let mut row = vec![
        record.target.ip.clone(),
        id(record.target.company_id),
        id(record.target.terminal_id),
        record.status.as_str().to_string(),
        record.target.segment().to_string(),
        record.target.operation().to_string(),
    ];
    row.extend(record.hardware.fields().iter().map(|f| f.to_string()));
    row.push(timestamp(record.first_seen_at));
    row.push(timestamp(record.last_updated_at));
    row
}

/// Writes inventory records as a CSV file
#[derive(Debug, Clone)]
pub struct CsvReport {
    directory: PathBuf,
}

impl CsvReport {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `inventario_hardware_<YYYYmmdd_HHMMSS>.csv`
    #[must_use]
    pub fn file_name(at: DateTime<Local>) -> String {
        format!("inventario_hardware_{}.csv", at.format("%Y%m%d_%H%M%S"))
    }

    /// Encode `records` into any writer
    pub fn write_to<W: Write>(&self, writer: W, records: &[InventoryRecord]) -> Result<()> {
        let mut wtr = WriterBuilder::new()
            .delimiter(DELIMITER)
            .from_writer(writer);

        wtr.write_record(COLUMNS)?;
        for record in records {
            wtr.write_record(row(record))?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write `records` to a new timestamped file and return its absolute path
    pub fn write(&self, records: &[InventoryRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(Self::file_name(Local::now()));
        let file = File::create(&path)?;
        self.write_to(file, records)?;

        let path = fs::canonicalize(&path).map_err(|e| {
            InventoryError::ReportError(format!("cannot resolve {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), rows = records.len(), "Report written");
        Ok(path)
    }

    /// Write collected results as first-seen records
    pub fn write_results(&self, results: &[HostResult]) -> Result<PathBuf> {
        let now = Utc::now();
        let records: Vec<InventoryRecord> = results
            .iter()
            .map(|result| merge_record(result, None, now))
            .collect();
        self.write(&records)
    }
}
