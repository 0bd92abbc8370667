//! Inventory error types

use thiserror::Error;

use crate::model::CollectionStatus;

/// Failures while opening a remote session.
///
/// Every variant maps onto exactly one [`CollectionStatus`], which is what the
/// orchestrator records for the host.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Neither a password nor a private key was supplied
    #[error("No credentials supplied: a password or a private key path is required")]
    InvalidCredentials,

    /// The server rejected the credentials, or the key could not be used
    #[error("Authentication failed for {user}@{host}: {reason}")]
    Auth {
        host: String,
        user: String,
        reason: String,
    },

    /// Timeout, refusal, or a dropped TCP connection
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    /// The SSH transport misbehaved after the socket was up
    #[error("SSH protocol error with {host}: {reason}")]
    Protocol { host: String, reason: String },

    /// Anything else
    #[error("Unexpected error with {host}: {reason}")]
    Unknown { host: String, reason: String },
}

impl SessionError {
    /// Collection status recorded for a host that failed this way
    #[must_use]
    pub fn status(&self) -> CollectionStatus {
        match self {
            Self::InvalidCredentials | Self::Auth { .. } => CollectionStatus::AuthFailure,
            Self::Connection { .. } => CollectionStatus::ConnectionFailure,
            Self::Protocol { .. } => CollectionStatus::ProtocolError,
            Self::Unknown { .. } => CollectionStatus::UnknownError,
        }
    }

    /// Whether the caller may try to connect again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Unknown { .. })
    }
}

/// Inventory operation errors
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The target list is empty or contains an unusable entry
    #[error("Invalid target list: {0}")]
    InvalidTargets(String),

    /// The circuit breaker aborted the run
    #[error("Aborted after {failures} consecutive connection failures: likely a credential, network or firewall issue")]
    CircuitOpen { failures: usize },

    /// The store is keyed on company/terminal numbers and a target lacks them
    #[error("Target {ip} has no company/terminal identity; the store cannot key it")]
    MissingIdentity { ip: String },

    /// Storage error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Report could not be written
    #[error("Report error: {0}")]
    ReportError(String),

    /// Target source could not be read
    #[error("Target source error: {0}")]
    TargetError(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding/decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Database error (when postgres feature is enabled)
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Result type for inventory operations
pub type Result<T> = std::result::Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn host_error(kind: &str) -> SessionError {
        let host = "10.0.0.1".to_string();
        let reason = "boom".to_string();
        match kind {
            "auth" => SessionError::Auth {
                host,
                user: "root".to_string(),
                reason,
            },
            "conn" => SessionError::Connection { host, reason },
            "proto" => SessionError::Protocol { host, reason },
            _ => SessionError::Unknown { host, reason },
        }
    }

    #[test]
    fn test_session_error_status() {
        assert_eq!(
            SessionError::InvalidCredentials.status(),
            CollectionStatus::AuthFailure
        );
        assert_eq!(host_error("auth").status(), CollectionStatus::AuthFailure);
        assert_eq!(
            host_error("conn").status(),
            CollectionStatus::ConnectionFailure
        );
        assert_eq!(host_error("proto").status(), CollectionStatus::ProtocolError);
        assert_eq!(host_error("other").status(), CollectionStatus::UnknownError);
    }

    #[test]
    fn test_session_error_retryable() {
        assert!(host_error("conn").is_retryable());
        assert!(host_error("other").is_retryable());
        assert!(!host_error("auth").is_retryable());
        assert!(!host_error("proto").is_retryable());
        assert!(!SessionError::InvalidCredentials.is_retryable());
    }

    #[test]
    fn test_circuit_open_message() {
        let err = InventoryError::CircuitOpen { failures: 10 };
        assert!(err.to_string().contains("10 consecutive"));
        assert!(err.to_string().contains("firewall"));
    }
}
