//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ReleaseError;
use crate::filesys::file::File;
use crate::health::readiness::ReadinessOptions;
use crate::logs::LogLevel;
use crate::models::environment::{Environment, EnvironmentName};
use crate::models::image::TrackedImage;
use crate::utils::CooldownOptions;

/// Controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Orchestrator access
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Staging environment
    #[serde(default = "Environment::default_staging")]
    pub staging: Environment,

    /// Production environment
    #[serde(default = "Environment::default_production")]
    pub production: Environment,

    /// Images whose tags are managed, primary service first
    #[serde(default = "default_images")]
    pub images: Vec<TrackedImage>,

    /// Service a single-service rollback restores
    #[serde(default = "default_primary_service")]
    pub primary_service: String,

    /// Health probing and readiness wait
    #[serde(default)]
    pub health: HealthSettings,

    /// Secrets and bootstrap objects
    #[serde(default)]
    pub secrets: SecretSettings,

    /// Lease lifetime in seconds
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
}

fn default_images() -> Vec<TrackedImage> {
    vec![
        TrackedImage::new("gateway", "gateway-proxy"),
        TrackedImage::new("bridge", "gateway-bridge"),
        TrackedImage::new("ledger", "gateway-ledger"),
    ]
}

fn default_primary_service() -> String {
    "gateway".to_string()
}

fn default_lease_ttl() -> u64 {
    15 * 60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            orchestrator: OrchestratorSettings::default(),
            staging: Environment::default_staging(),
            production: Environment::default_production(),
            images: default_images(),
            primary_service: default_primary_service(),
            health: HealthSettings::default(),
            secrets: SecretSettings::default(),
            lease_ttl_secs: default_lease_ttl(),
        }
    }
}

impl Settings {
    /// Load settings from `file`, falling back to defaults when it is absent
    pub async fn load(file: &File) -> Result<Self, ReleaseError> {
        let settings = file.read_json_opt::<Settings>().await?.unwrap_or_default();
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ReleaseError> {
        if self.staging.name != EnvironmentName::Staging {
            return Err(ReleaseError::ConfigError(
                "staging environment must be named \"staging\"".to_string(),
            ));
        }
        if self.production.name != EnvironmentName::Production {
            return Err(ReleaseError::ConfigError(
                "production environment must be named \"production\"".to_string(),
            ));
        }
        if self.images.is_empty() {
            return Err(ReleaseError::ConfigError("no tracked images configured".to_string()));
        }
        if self.primary_image().is_none() {
            return Err(ReleaseError::ConfigError(format!(
                "primary service {} is not a tracked image",
                self.primary_service
            )));
        }
        Ok(())
    }

    pub fn environment(&self, name: EnvironmentName) -> &Environment {
        match name {
            EnvironmentName::Staging => &self.staging,
            EnvironmentName::Production => &self.production,
        }
    }

    pub fn primary_image(&self) -> Option<&TrackedImage> {
        self.images.iter().find(|image| image.service == self.primary_service)
    }

    pub fn tracked_services(&self) -> Vec<String> {
        self.images.iter().map(|image| image.service.clone()).collect()
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Docker binary
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            docker_bin: default_docker_bin(),
        }
    }
}

/// Health probing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Per-request timeout of a single probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Wait after a deploy before the first probe
    #[serde(default = "default_settle")]
    pub settle_secs: u64,

    /// Overall readiness budget after a deploy
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,

    /// First delay between readiness polls
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound of the delay between readiness polls
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_settle() -> u64 {
    5
}

fn default_readiness_timeout() -> u64 {
    45
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_backoff_max() -> u64 {
    10
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            settle_secs: default_settle(),
            readiness_timeout_secs: default_readiness_timeout(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_secs: default_backoff_max(),
        }
    }
}

impl HealthSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn readiness(&self) -> ReadinessOptions {
        ReadinessOptions {
            settle: Duration::from_secs(self.settle_secs),
            timeout: Duration::from_secs(self.readiness_timeout_secs),
            backoff: CooldownOptions {
                base_delay: Duration::from_millis(self.backoff_base_ms),
                max_delay: Duration::from_secs(self.backoff_max_secs),
                multiplier: 2.0,
            },
        }
    }
}

/// Secrets and bootstrap object settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretSettings {
    /// Secrets every run needs
    #[serde(default = "default_required_secrets")]
    pub required: Vec<String>,

    /// The one secret that may be generated when nothing provides it
    #[serde(default = "default_bridge_secret")]
    pub bridge_secret: String,

    /// Prefix of the environment variables secrets are read from
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// Name of the shared-auth config object
    #[serde(default = "default_shared_auth_config")]
    pub shared_auth_config: String,
}

fn default_required_secrets() -> Vec<String> {
    vec![default_bridge_secret()]
}

fn default_bridge_secret() -> String {
    "bridge_token".to_string()
}

fn default_env_prefix() -> String {
    "STACKCTL".to_string()
}

fn default_shared_auth_config() -> String {
    "gateway_auth_profiles".to_string()
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            required: default_required_secrets(),
            bridge_secret: default_bridge_secret(),
            env_prefix: default_env_prefix(),
            shared_auth_config: default_shared_auth_config(),
        }
    }
}
