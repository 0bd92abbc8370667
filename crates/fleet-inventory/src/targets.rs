//! Target list loading

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{InventoryError, Result};
use crate::model::{Target, OPERATION_KEY, SEGMENT_KEY};

/// Provider of the targets for one run
#[async_trait]
pub trait TargetSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Target>>;
}

const IP_HEADERS: &[&str] = &["IP", "ADDRESS", "HOST"];
const COMPANY_HEADERS: &[&str] = &["COMPANY_ID", "NROEMPRESA"];
const TERMINAL_HEADERS: &[&str] = &["TERMINAL_ID", "NROCHECKOUT"];
const SEGMENT_HEADERS: &[&str] = &["SEGMENT", "SEGMENTO"];
const OPERATION_HEADERS: &[&str] = &["OPERATION", "OPERACAO"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Ip,
    Company,
    Terminal,
    Segment,
    Operation,
    Extra,
}

fn classify(header: &str) -> Column {
    let header = header.trim().to_ascii_uppercase();
    let is = |names: &[&str]| names.contains(&header.as_str());
    if is(IP_HEADERS) {
        Column::Ip
    } else if is(COMPANY_HEADERS) {
        Column::Company
    } else if is(TERMINAL_HEADERS) {
        Column::Terminal
    } else if is(SEGMENT_HEADERS) {
        Column::Segment
    } else if is(OPERATION_HEADERS) {
        Column::Operation
    } else {
        Column::Extra
    }
}

/// Targets read from a CSV file with a header row.
///
/// Recognised headers (case-insensitive): `IP`, `COMPANY_ID`/`NROEMPRESA`,
/// `TERMINAL_ID`/`NROCHECKOUT`, `SEGMENT`, `OPERATION`. Any other column is
/// kept as target metadata. Rows without an address are skipped.
#[derive(Debug, Clone)]
pub struct CsvTargetSource {
    path: PathBuf,
}

impl CsvTargetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse targets from CSV text, `;` or `,` separated
    pub fn parse(&self, content: &str) -> Result<Vec<Target>> {
        let delimiter = sniff_delimiter(content);
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader.headers()?.clone();
        let columns: Vec<Column> = headers.iter().map(classify).collect();
        if !columns.contains(&Column::Ip) {
            return Err(InventoryError::TargetError(format!(
                "{}: no IP column in header",
                self.path.display()
            )));
        }

        let mut targets = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            // Header is line 1
            let line = index + 2;
            match parse_row(&headers, &columns, &record, line)? {
                Some(target) => targets.push(target),
                None => debug!(line, "Skipping row without an IP address"),
            }
        }

        Ok(targets)
    }
}

fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

fn parse_id(value: &str, column: &str, line: usize) -> Result<Option<i64>> {
    if value.is_empty() {
        return Ok(None);
    }
    value.parse().map(Some).map_err(|_| {
        InventoryError::TargetError(format!("line {line}: {column} is not a number: {value:?}"))
    })
}

fn parse_row(
    headers: &StringRecord,
    columns: &[Column],
    record: &StringRecord,
    line: usize,
) -> Result<Option<Target>> {
    let mut target = Target::new("");
    for ((header, column), value) in headers.iter().zip(columns).zip(record.iter()) {
        match column {
            Column::Ip => target.ip = value.to_string(),
            Column::Company => target.company_id = parse_id(value, header, line)?,
            Column::Terminal => target.terminal_id = parse_id(value, header, line)?,
            Column::Segment if !value.is_empty() => {
                target.metadata.insert(SEGMENT_KEY.to_string(), value.to_string());
            }
            Column::Operation if !value.is_empty() => {
                target
                    .metadata
                    .insert(OPERATION_KEY.to_string(), value.to_string());
            }
            Column::Extra if !value.is_empty() => {
                target.metadata.insert(header.to_string(), value.to_string());
            }
            _ => {}
        }
    }

    Ok((!target.ip.is_empty()).then_some(target))
}

#[async_trait]
impl TargetSource for CsvTargetSource {
    async fn load(&self) -> Result<Vec<Target>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            InventoryError::TargetError(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let targets = self.parse(&content)?;
        if targets.is_empty() {
            warn!(path = %self.path.display(), "Target list has no usable rows");
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_with_aliases_and_extras() {
        let source = CsvTargetSource::new("targets.csv");
        let content = "NROEMPRESA;NROCHECKOUT;IP;SEGMENTO;STORE\n\
                       1;12;10.1.0.12;Supermarket;Centro\n\
                       1;13; ;Supermarket;Centro\n\
                       2;1;10.2.0.1;;\n";

        let targets = source.parse(content).unwrap();
        assert_eq!(targets.len(), 2);

        let first = &targets[0];
        assert_eq!(first.ip, "10.1.0.12");
        assert_eq!(first.company_id, Some(1));
        assert_eq!(first.terminal_id, Some(12));
        assert_eq!(first.segment(), "Supermarket");
        assert_eq!(first.metadata.get("STORE").map(String::as_str), Some("Centro"));

        let second = &targets[1];
        assert_eq!(second.identity().to_string(), "2/1");
        assert!(second.metadata.is_empty());
    }

    #[test]
    fn test_parse_comma_file_without_ids() {
        let source = CsvTargetSource::new("targets.csv");
        let targets = source.parse("ip,operation\n10.0.0.1,Retail\n").unwrap();
        assert_eq!(targets.len(), 1);
        assert!(!targets[0].has_terminal_identity());
        assert_eq!(targets[0].operation(), "Retail");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let source = CsvTargetSource::new("targets.csv");
        let err = source.parse("HOSTNAME;STORE\npdv01;1\n").unwrap_err();
        assert!(err.to_string().contains("no IP column"));

        let err = source
            .parse("IP;COMPANY_ID\n10.0.0.1;one\n")
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("targets.csv");
        fs::write(&path, "IP,COMPANY_ID,TERMINAL_ID\n10.0.0.5,4,5\n").unwrap();

        let targets = CsvTargetSource::new(&path).load().await.unwrap();
        assert_eq!(targets, vec![Target::new("10.0.0.5").with_terminal(4, 5)]);

        let missing = CsvTargetSource::new(dir.path().join("nope.csv")).load().await;
        assert!(matches!(missing, Err(InventoryError::TargetError(_))));
    }
}
