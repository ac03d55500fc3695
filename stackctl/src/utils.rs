//! Utility functions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Version information for stackctl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Cooldown options for exponential backoff
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Calculate exponential backoff delay
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let delay_secs = options.base_delay.as_secs_f64() * options.multiplier.powi(attempt as i32);
    let capped_delay = delay_secs.min(options.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped_delay)
}

/// Identity recorded as the actor of a deployment log entry.
///
/// `explicit` wins, then `STACKCTL_ACTOR`, then `$USER@<hostname>`.
pub fn resolve_actor(explicit: Option<&str>) -> String {
    if let Some(actor) = explicit.filter(|a| !a.trim().is_empty()) {
        return actor.trim().to_string();
    }
    if let Ok(actor) = std::env::var("STACKCTL_ACTOR") {
        if !actor.trim().is_empty() {
            return actor.trim().to_string();
        }
    }
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());
    format!("{}@{}", user, host)
}
