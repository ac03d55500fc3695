//! Orchestrator control plane
//!
//! The controllers only issue declarative requests: ensure a network,
//! apply a stack, tag and inspect images, ensure a config object. Anything
//! beyond that belongs to the platform.

pub mod docker;
pub mod memory;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::ReleaseError;
use crate::models::image::{ImageInfo, ImageRef};

/// Result of a create-if-absent request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

impl fmt::Display for EnsureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsureOutcome::Created => f.write_str("created"),
            EnsureOutcome::AlreadyExists => f.write_str("already exists"),
        }
    }
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Create an attachable overlay network unless it exists
    async fn ensure_network(&self, name: &str) -> Result<EnsureOutcome, ReleaseError>;

    /// Create the stack or update it in place. `env` is visible to the
    /// stack file's variable interpolation.
    async fn deploy_stack(
        &self,
        stack_name: &str,
        stack_file: &Path,
        env: &[(String, SecretString)],
    ) -> Result<(), ReleaseError>;

    /// Point `target` at the image currently referenced by `source`
    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ReleaseError>;

    /// Look up an image, `None` when no image carries the reference
    async fn inspect_image(&self, image: &ImageRef) -> Result<Option<ImageInfo>, ReleaseError>;

    /// Tags present locally for a repository
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, ReleaseError>;

    /// Create a config object with `body` unless one with that name exists
    async fn ensure_config(&self, name: &str, body: &[u8]) -> Result<EnsureOutcome, ReleaseError>;
}
