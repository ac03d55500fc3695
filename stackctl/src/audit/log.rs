//! Append-only deployment log.
//!
//! One JSON object per line. Entries are only ever appended; readers scan
//! the whole file.

use tracing::{debug, warn};

use crate::errors::ReleaseError;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentLogEntry;

#[derive(Debug, Clone)]
pub struct DeploymentLog {
    file: File,
}

impl DeploymentLog {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Append one entry
    pub async fn append(&self, entry: &DeploymentLogEntry) -> Result<(), ReleaseError> {
        let line = serde_json::to_string(entry)?;
        self.file.append_line(&line).await?;
        debug!(action = %entry.action, status = %entry.status, tag = %entry.tag, "deployment log appended");
        Ok(())
    }

    /// All entries, oldest first. Lines that do not parse are skipped.
    pub async fn entries(&self) -> Result<Vec<DeploymentLogEntry>, ReleaseError> {
        if !self.file.exists().await {
            return Ok(Vec::new());
        }
        let contents = self.file.read_string().await?;
        let mut entries = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DeploymentLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = index + 1, error = %e, "skipping malformed deployment log line"),
            }
        }
        Ok(entries)
    }
}
