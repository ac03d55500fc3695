//! Rollback snapshot records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::environment::EnvironmentName;
use crate::models::image::parse_rollback_tag;

/// A recovery point: the production image as it was before a promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub source_environment: EnvironmentName,
}

impl RollbackRecord {
    /// Rebuild a record from an existing production rollback tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        parse_rollback_tag(tag).map(|created_at| Self {
            tag: tag.to_string(),
            created_at,
            source_environment: EnvironmentName::Production,
        })
    }
}
