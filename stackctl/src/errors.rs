//! Error types for stackctl

use thiserror::Error;

use crate::health::prober::HealthReport;

/// Main error type for stackctl
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Orchestrator error: {0}")]
    OrchestratorError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Secret error: {0}")]
    SecretError(String),

    #[error("Lease held by {holder} (action {action}) until {expires_at}")]
    LeaseHeld {
        holder: String,
        action: String,
        expires_at: String,
    },

    #[error("Rollback tag {tag} already exists for {service}")]
    TagCollision { tag: String, service: String },

    #[error("Rollback snapshot {tag} incomplete, captured [{}]: {reason}", captured.join(", "))]
    SnapshotIncomplete {
        tag: String,
        captured: Vec<String>,
        reason: String,
    },

    #[error("Timed out after {waited_secs}s waiting for {environment} to become healthy")]
    ReadinessTimeout {
        environment: String,
        waited_secs: u64,
        last_report: HealthReport,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ReleaseError {
    fn from(err: anyhow::Error) -> Self {
        ReleaseError::Internal(err.to_string())
    }
}
