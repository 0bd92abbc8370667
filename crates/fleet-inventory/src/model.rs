//! Inventory data model
//!
//! Core data structures shared by detection, orchestration and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Placeholder for a hardware fact that could not be resolved.
///
/// Snapshot fields never hold an empty string; diffing and reporting rely on it.
pub const NOT_DETECTED: &str = "Not detected";

/// Metadata key holding the store segment a terminal belongs to
pub const SEGMENT_KEY: &str = "SEGMENT";
/// Metadata key holding the operation a terminal serves
pub const OPERATION_KEY: &str = "OPERATION";

/// One remote host to inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Address used for the SSH connection
    pub ip: String,
    /// Owning company number
    pub company_id: Option<i64>,
    /// Terminal (checkout) number within the company
    pub terminal_id: Option<i64>,
    /// Free-form columns carried through from the target list
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Target {
    /// Create a target with no company/terminal identity
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into().trim().to_string(),
            company_id: None,
            terminal_id: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach the company/terminal identity
    #[must_use]
    pub fn with_terminal(mut self, company_id: i64, terminal_id: i64) -> Self {
        self.company_id = Some(company_id);
        self.terminal_id = Some(terminal_id);
        self
    }

    /// Attach a metadata column
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity used to match persisted records
    #[must_use]
    pub fn identity(&self) -> IdentityKey {
        match (self.company_id, self.terminal_id) {
            (Some(company_id), Some(terminal_id)) => IdentityKey::Terminal {
                company_id,
                terminal_id,
            },
            _ => IdentityKey::Ip(self.ip.clone()),
        }
    }

    /// Whether both halves of the terminal identity are present
    #[must_use]
    pub fn has_terminal_identity(&self) -> bool {
        self.company_id.is_some() && self.terminal_id.is_some()
    }

    #[must_use]
    pub fn segment(&self) -> &str {
        self.metadata.get(SEGMENT_KEY).map_or("", String::as_str)
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        self.metadata.get(OPERATION_KEY).map_or("", String::as_str)
    }
}

/// Key a persisted record is unique on
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKey {
    /// Company and terminal numbers
    Terminal { company_id: i64, terminal_id: i64 },
    /// Bare address, for targets without a terminal identity
    Ip(String),
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminal {
                company_id,
                terminal_id,
            } => write!(f, "{company_id}/{terminal_id}"),
            Self::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

/// Hardware facts detected on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub motherboard: String,
    pub processor: String,
    /// Rendered as `cores/threads`
    pub cores_threads: String,
    /// Size bucket plus memory generation, e.g. `8GB DDR4`
    pub ram: String,
    pub disk_type: String,
    pub disk_capacity: String,
    pub os_release: String,
    /// `major.minor`
    pub kernel: String,
}

impl Default for HardwareSnapshot {
    fn default() -> Self {
        Self {
            motherboard: NOT_DETECTED.to_string(),
            processor: NOT_DETECTED.to_string(),
            cores_threads: NOT_DETECTED.to_string(),
            ram: NOT_DETECTED.to_string(),
            disk_type: NOT_DETECTED.to_string(),
            disk_capacity: NOT_DETECTED.to_string(),
            os_release: NOT_DETECTED.to_string(),
            kernel: NOT_DETECTED.to_string(),
        }
    }
}

impl HardwareSnapshot {
    /// Whether a field value counts as a real detection
    #[must_use]
    pub fn is_resolved(value: &str) -> bool {
        let value = value.trim();
        !(value.is_empty()
            || value == NOT_DETECTED
            || value.eq_ignore_ascii_case("n/a")
            || value == "0GB"
            || value == "0.0GB"
            || value.starts_with("0/")
            || value.ends_with(&format!("/{NOT_DETECTED}")))
    }

    /// Number of resolved fields among the seven hardware facts (kernel excluded)
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        [
            &self.motherboard,
            &self.processor,
            &self.cores_threads,
            &self.ram,
            &self.disk_type,
            &self.disk_capacity,
            &self.os_release,
        ]
        .iter()
        .filter(|v| Self::is_resolved(v))
        .count()
    }

    /// All fields in canonical column order
    #[must_use]
    pub fn fields(&self) -> [&str; 8] {
        [
            self.motherboard.as_str(),
            self.processor.as_str(),
            self.cores_threads.as_str(),
            self.ram.as_str(),
            self.disk_type.as_str(),
            self.disk_capacity.as_str(),
            self.os_release.as_str(),
            self.kernel.as_str(),
        ]
    }

    /// Replace empty values with the placeholder
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.motherboard,
            &mut self.processor,
            &mut self.cores_threads,
            &mut self.ram,
            &mut self.disk_type,
            &mut self.disk_capacity,
            &mut self.os_release,
            &mut self.kernel,
        ] {
            let trimmed = field.trim();
            *field = if trimmed.is_empty() {
                NOT_DETECTED.to_string()
            } else {
                trimmed.to_string()
            };
        }
        self
    }
}

/// Outcome of collecting one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionStatus {
    /// Connected and resolved at least three hardware facts
    Success,
    /// Connected but resolved fewer facts
    PartialSuccess,
    /// Credentials rejected or unusable
    AuthFailure,
    /// Host unreachable after retries
    ConnectionFailure,
    /// Transport-level failure
    ProtocolError,
    /// Anything unclassified
    UnknownError,
}

impl CollectionStatus {
    /// Get string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::PartialSuccess => "PARTIAL_SUCCESS",
            Self::AuthFailure => "AUTH_FAILURE",
            Self::ConnectionFailure => "CONNECTION_FAILURE",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Host-level status this outcome maps to
    #[must_use]
    pub fn host_status(&self) -> HostStatus {
        match self {
            Self::Success | Self::PartialSuccess => HostStatus::Online,
            _ => HostStatus::Offline,
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.host_status() == HostStatus::Online
    }
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted host status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HostStatus {
    Online,
    Offline,
    /// No longer present in the active target list
    Inactive,
}

impl HostStatus {
    /// Get string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ONLINE" => Ok(Self::Online),
            "OFFLINE" => Ok(Self::Offline),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(format!("unknown host status: {other}")),
        }
    }
}

/// Per-target output of one orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResult {
    pub target: Target,
    pub snapshot: HardwareSnapshot,
    pub status: CollectionStatus,
    /// Failure description for offline hosts
    pub error: Option<String>,
    /// Connection attempts made, including the successful one
    pub attempts: u32,
}

impl HostResult {
    /// Result for a host that never produced a snapshot
    pub fn failed(
        target: Target,
        status: CollectionStatus,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            target,
            snapshot: HardwareSnapshot::default(),
            status,
            error: Some(error.into()),
            attempts,
        }
    }
}

/// Persisted inventory entry, unique per [`IdentityKey`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub target: Target,
    pub hardware: HardwareSnapshot,
    pub status: HostStatus,
    /// Outcome of the pass that produced this record; not persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionStatus>,
    /// Set once, when the identity is first recorded
    pub first_seen_at: DateTime<Utc>,
    /// Refreshed on every pass
    pub last_updated_at: DateTime<Utc>,
    /// Moves only when identity or hardware fields change
    pub last_changed_at: DateTime<Utc>,
}

impl InventoryRecord {
    #[must_use]
    pub fn identity(&self) -> IdentityKey {
        self.target.identity()
    }
}

/// Counts reported back to the operator at the end of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Targets submitted
    pub total: usize,
    /// Targets that produced a result before the run ended
    pub processed: usize,
    pub online: usize,
    pub offline: usize,
    /// Rows written to the store
    pub written: usize,
    /// Written rows whose identity and hardware fields were unchanged
    pub unchanged: usize,
    /// Rows the store rejected
    pub failed_rows: usize,
    /// Identities transitioned to inactive
    pub inactivated: usize,
    /// Report written instead of the store
    pub report_path: Option<PathBuf>,
}

impl RunSummary {
    /// Calculate collection counts from orchestrator results
    #[must_use]
    pub fn from_results(total: usize, results: &[HostResult]) -> Self {
        let mut summary = Self {
            total,
            processed: results.len(),
            ..Self::default()
        };

        for result in results {
            if result.status.is_online() {
                summary.online += 1;
            } else {
                summary.offline += 1;
            }
        }

        summary
    }
}
