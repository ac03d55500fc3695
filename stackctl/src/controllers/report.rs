//! What a controller run ended with

use std::fmt;

use tracing::error;

use crate::errors::ReleaseError;
use crate::health::prober::HealthReport;
use crate::images::tags::TagOutcome;
use crate::models::deployment::{Action, RunStatus};
use crate::models::environment::EnvironmentName;

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Success,
    Partial,
    Failed(String),
    Aborted,
    NotFound(String),
}

impl Terminal {
    /// 0 for success, accepted partial and a declined confirmation
    pub fn exit_code(&self) -> u8 {
        match self {
            Terminal::Success | Terminal::Partial | Terminal::Aborted => 0,
            Terminal::Failed(_) | Terminal::NotFound(_) => 1,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            Terminal::Success => RunStatus::Success,
            Terminal::Partial => RunStatus::Partial,
            Terminal::Aborted => RunStatus::Aborted,
            Terminal::Failed(_) | Terminal::NotFound(_) => RunStatus::Failed,
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Success => f.write_str("SUCCESS"),
            Terminal::Partial => f.write_str("PARTIAL"),
            Terminal::Failed(reason) => write!(f, "FAILED: {}", reason),
            Terminal::Aborted => f.write_str("ABORTED"),
            Terminal::NotFound(tag) => write!(f, "NOT FOUND: {}", tag),
        }
    }
}

/// Summary of one controller run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub action: Action,
    pub terminal: Terminal,

    /// Tag produced or restored
    pub tag: Option<String>,

    /// Services the run touched
    pub services: Vec<String>,

    /// Health per environment, in probe order
    pub health: Vec<(EnvironmentName, HealthReport)>,

    /// Tag moves per service
    pub tags: Vec<(String, TagOutcome)>,

    /// Deficiencies that did not stop the run
    pub notes: Vec<String>,

    /// Whether a deployment log entry was appended
    pub logged: bool,
}

impl RunReport {
    pub fn new(action: Action, terminal: Terminal) -> Self {
        Self {
            action,
            terminal,
            tag: None,
            services: Vec::new(),
            health: Vec::new(),
            tags: Vec::new(),
            notes: Vec::new(),
            logged: false,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.terminal.exit_code()
    }

    /// Take the result of appending the log entry. A failed append keeps
    /// the terminal state and is reported as a note.
    pub(crate) fn logged_or_note(&mut self, appended: Result<(), ReleaseError>) {
        match appended {
            Ok(()) => self.logged = true,
            Err(e) => {
                error!(action = %self.action, error = %e, "deployment log entry not written");
                self.logged = false;
                self.notes.push(format!("deployment log entry not written: {}", e));
            }
        }
    }
}

/// `SUCCESS` when the deployment was healthy and every tag move went through
pub(crate) fn deployment_terminal(status: RunStatus, tags: &[(String, TagOutcome)]) -> Terminal {
    let tag_failed = tags
        .iter()
        .any(|(_, outcome)| matches!(outcome, TagOutcome::Failed(_)));
    match status {
        RunStatus::Success if !tag_failed => Terminal::Success,
        _ => Terminal::Partial,
    }
}
