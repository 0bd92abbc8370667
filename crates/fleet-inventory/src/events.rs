//! Progress events for the presentation layer
//!
//! Workers and the orchestrator share one [`ProgressSink`]; the channel behind
//! it has a single consumer, so events arrive one at a time and in send order.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Event severity / kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    /// Carries a 0-100 percentage
    Progress,
    /// Run completed
    Finish,
    /// Carries the absolute path of the artifact to open
    OpenFile,
}

impl EventLevel {
    /// Get string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Progress => "PROGRESS",
            Self::Finish => "FINISH",
            Self::OpenFile => "OPEN_FILE",
        }
    }
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional payload of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Percent(f64),
    Path(PathBuf),
    Text(String),
}

/// One entry on the progress stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub level: EventLevel,
    pub message: String,
    pub value: Option<EventValue>,
}

impl ProgressEvent {
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            value: None,
        }
    }

    /// Attach a payload
    #[must_use]
    pub fn with_value(mut self, value: EventValue) -> Self {
        self.value = Some(value);
        self
    }

    /// Percentage carried by a progress event
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match self.value {
            Some(EventValue::Percent(p)) => Some(p),
            _ => None,
        }
    }
}

/// Cloneable sending half of the progress stream.
///
/// A disabled sink drops everything. Sends never fail the caller: a consumer
/// that went away just stops receiving.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    /// Create a sink and the receiver that drains it
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards every event
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub async fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                tracing::trace!("Progress receiver dropped; event discarded");
            }
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::new(EventLevel::Info, message)).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::new(EventLevel::Warning, message))
            .await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::new(EventLevel::Error, message)).await;
    }

    pub async fn progress(&self, message: impl Into<String>, percent: f64) {
        let event = ProgressEvent::new(EventLevel::Progress, message)
            .with_value(EventValue::Percent(percent.clamp(0.0, 100.0)));
        self.emit(event).await;
    }

    pub async fn finish(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::new(EventLevel::Finish, message))
            .await;
    }

    pub async fn open_file(&self, path: impl Into<PathBuf>) {
        let event = ProgressEvent::new(EventLevel::OpenFile, "Opening result file")
            .with_value(EventValue::Path(path.into()));
        self.emit(event).await;
    }
}
