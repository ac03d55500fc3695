//! Container image references and the tagging scheme behind rollback

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live production pointer
pub const LATEST_TAG: &str = "latest";

/// Most recently validated candidate
pub const STAGING_TAG: &str = "staging";

/// Prefix of recovery snapshot tags
pub const ROLLBACK_PREFIX: &str = "rollback-";

const ROLLBACK_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// `<repository>:<tag>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(repository: &str, tag: &str) -> Self {
        Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        }
    }

    pub fn latest(repository: &str) -> Self {
        Self::new(repository, LATEST_TAG)
    }

    pub fn staging(repository: &str) -> Self {
        Self::new(repository, STAGING_TAG)
    }

    /// Same repository, different tag
    pub fn with_tag(&self, tag: &str) -> Self {
        Self::new(&self.repository, tag)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// An image the controller manages tags for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedImage {
    /// Service the image backs
    pub service: String,

    /// Image repository without tag
    pub repository: String,
}

impl TrackedImage {
    pub fn new(service: &str, repository: &str) -> Self {
        Self {
            service: service.to_string(),
            repository: repository.to_string(),
        }
    }
}

/// What the orchestrator knows about a local image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Content-addressed image id
    pub id: String,

    /// Build time of the image
    pub created: DateTime<Utc>,
}

/// Rollback tag for a snapshot taken at `at` (second resolution)
pub fn rollback_tag_at(at: DateTime<Utc>) -> String {
    format!("{}{}", ROLLBACK_PREFIX, at.format(ROLLBACK_TIME_FORMAT))
}

/// Snapshot time encoded in a rollback tag, or `None` for any other tag
pub fn parse_rollback_tag(tag: &str) -> Option<DateTime<Utc>> {
    let stamp = tag.strip_prefix(ROLLBACK_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, ROLLBACK_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
