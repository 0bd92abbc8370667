//! Fleet hardware inventory
//!
//! Fingerprints the hardware of Linux terminals over SSH and reconciles the
//! results into a persisted inventory.
//!
//! The pipeline, leaves first:
//! - [`ssh`] authenticates against one host and runs probe commands
//! - [`detection`] turns a shell into a [`HardwareSnapshot`]
//! - [`orchestrator`] fans detection out across a target list with bounded
//!   concurrency and a circuit breaker
//! - [`reconcile`] merges the results with prior state and writes them through
//!   an [`InventoryRepository`]
//!
//! [`report`] renders the same records as a CSV artifact when no database is
//! available, and [`targets`] loads the target list.

pub mod detection;
pub mod error;
pub mod events;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod reconcile;
pub mod report;
pub mod ssh;
pub mod store;
pub mod targets;

pub use detection::DetectionEngine;
pub use error::{InventoryError, Result, SessionError};
pub use events::{EventLevel, EventValue, ProgressEvent, ProgressSink};
pub use model::{
    CollectionStatus, HardwareSnapshot, HostResult, HostStatus, IdentityKey, InventoryRecord,
    RunSummary, Target, NOT_DETECTED,
};
pub use orchestrator::{CircuitBreaker, InventoryOrchestrator, OrchestratorOptions, ResultSet};
pub use reconcile::{
    has_changes, merge_record, BatchOutcome, InventoryRepository, ReconcileOptions,
    ReconcileSummary, ReconciliationStore,
};
pub use report::CsvReport;
pub use ssh::{CommandOutput, Connector, Credentials, RemoteShell, SessionOptions, SshConnector};
pub use store::MemoryRepository;
#[cfg(feature = "postgres")]
pub use store::PgRepository;
pub use targets::{CsvTargetSource, TargetSource};
