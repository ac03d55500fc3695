//! Deployment log models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Controller action recorded in the deployment log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    DeployStaging,
    Promote,
    Rollback,
    SpinUp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::DeployStaging => "DEPLOY_STAGING",
            Action::Promote => "PROMOTE",
            Action::Rollback => "ROLLBACK",
            Action::SpinUp => "SPIN_UP",
        };
        f.write_str(s)
    }
}

/// Terminal status of a controller run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Failed => "FAILED",
            RunStatus::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// One line of the append-only deployment log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLogEntry {
    pub timestamp: DateTime<Utc>,

    /// Who ran the controller
    pub actor: String,

    pub action: Action,

    /// Tag the run produced or restored
    pub tag: String,

    pub status: RunStatus,

    /// Services the run touched
    pub services: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
