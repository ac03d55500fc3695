//! Finite State Machine for staging to production promotion

use serde::{Deserialize, Serialize};

use crate::models::deployment::RunStatus;

/// Promotion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionState {
    /// Probing staging
    CheckStaging,

    /// Waiting for the operator
    Confirm,

    /// Capturing the current production images
    SnapshotRollback,

    /// Moving `latest` to the staging images
    Retag,

    /// Re-applying the production stack
    DeployProd,

    /// Probing production
    VerifyProd,

    /// Appending the deployment log entry
    Log,

    /// Logged, terminal
    Finished,

    /// Staging not healthy, terminal, never logged
    Failed,

    /// Operator declined, terminal, never logged
    Aborted,
}

/// Promotion event
#[derive(Debug, Clone)]
pub enum PromotionEvent {
    StagingHealthy,
    StagingUnhealthy(String),
    Confirmed,
    Declined,
    /// Rollback tag, `None` when production had nothing to capture
    SnapshotTaken(Option<String>),
    SnapshotFailed(String),
    Retagged,
    Deployed,
    Verified(RunStatus),
    Logged,
}

/// Promotion FSM
#[derive(Debug, Clone)]
pub struct PromotionFsm {
    state: PromotionState,
    outcome: Option<RunStatus>,
    error: Option<String>,
    rollback_tag: Option<String>,
}

impl PromotionFsm {
    /// Create a new FSM checking staging
    pub fn new() -> Self {
        Self {
            state: PromotionState::CheckStaging,
            outcome: None,
            error: None,
            rollback_tag: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> PromotionState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Rollback tag created by the snapshot step
    pub fn rollback_tag(&self) -> Option<&str> {
        self.rollback_tag.as_deref()
    }

    /// Status to record, known once production was verified or the snapshot failed
    pub fn outcome(&self) -> Option<RunStatus> {
        match self.state {
            PromotionState::Failed => Some(RunStatus::Failed),
            PromotionState::Aborted => Some(RunStatus::Aborted),
            _ => self.outcome,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PromotionState::Finished | PromotionState::Failed | PromotionState::Aborted
        )
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: PromotionEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (PromotionState::CheckStaging, PromotionEvent::StagingHealthy) => PromotionState::Confirm,
            (PromotionState::CheckStaging, PromotionEvent::StagingUnhealthy(err)) => {
                self.error = Some(err.clone());
                PromotionState::Failed
            }

            (PromotionState::Confirm, PromotionEvent::Confirmed) => PromotionState::SnapshotRollback,
            (PromotionState::Confirm, PromotionEvent::Declined) => PromotionState::Aborted,

            (PromotionState::SnapshotRollback, PromotionEvent::SnapshotTaken(tag)) => {
                self.rollback_tag = tag.clone();
                PromotionState::Retag
            }
            // nothing was retagged yet, but the attempt is recorded
            (PromotionState::SnapshotRollback, PromotionEvent::SnapshotFailed(err)) => {
                self.error = Some(err.clone());
                self.outcome = Some(RunStatus::Failed);
                PromotionState::Log
            }

            (PromotionState::Retag, PromotionEvent::Retagged) => PromotionState::DeployProd,
            (PromotionState::DeployProd, PromotionEvent::Deployed) => PromotionState::VerifyProd,

            (PromotionState::VerifyProd, PromotionEvent::Verified(status)) => {
                if !matches!(status, RunStatus::Success | RunStatus::Partial) {
                    return Err(format!("Invalid verification status: {}", status));
                }
                self.outcome = Some(*status);
                PromotionState::Log
            }

            (PromotionState::Log, PromotionEvent::Logged) => PromotionState::Finished,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for PromotionFsm {
    fn default() -> Self {
        Self::new()
    }
}
