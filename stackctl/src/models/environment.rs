//! Environment models

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Deployment target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentName {
    Staging,
    Production,
}

impl EnvironmentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentName::Staging => "staging",
            EnvironmentName::Production => "production",
        }
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service reachable over HTTP inside an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Service name as declared in the stack file
    pub name: String,

    /// Published port
    pub port: u16,

    /// Primary health path
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Path tried when the primary path does not answer 2xx
    #[serde(default = "default_fallback_path")]
    pub fallback_path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_fallback_path() -> String {
    "/".to_string()
}

impl ServiceEndpoint {
    pub fn new(name: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            port,
            health_path: default_health_path(),
            fallback_path: default_fallback_path(),
        }
    }
}

/// A deployment target with its stack file and endpoints.
///
/// Environments are read from settings once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: EnvironmentName,

    /// Stack name passed to the orchestrator
    pub stack_name: String,

    /// Path to the declarative stack file
    pub stack_file: PathBuf,

    /// Overlay network the stack attaches to
    pub network: String,

    /// Host the published ports are reachable on
    #[serde(default = "default_host")]
    pub host: String,

    /// Services probed for aggregate health, in probe order
    pub services: Vec<ServiceEndpoint>,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Environment {
    /// Staging defaults for the gateway stack
    pub fn default_staging() -> Self {
        Self {
            name: EnvironmentName::Staging,
            stack_name: "gateway-staging".to_string(),
            stack_file: PathBuf::from("deploy/stack.staging.yml"),
            network: "gateway-staging-net".to_string(),
            host: default_host(),
            services: vec![
                ServiceEndpoint::new("gateway", 9766),
                ServiceEndpoint::new("bridge", 19789),
                ServiceEndpoint::new("ledger", 9767),
                ServiceEndpoint::new("tracing", 26686),
            ],
        }
    }

    /// Production defaults for the gateway stack
    pub fn default_production() -> Self {
        Self {
            name: EnvironmentName::Production,
            stack_name: "gateway".to_string(),
            stack_file: PathBuf::from("deploy/stack.production.yml"),
            network: "gateway-net".to_string(),
            host: default_host(),
            services: vec![
                ServiceEndpoint::new("gateway", 8766),
                ServiceEndpoint::new("bridge", 18789),
                ServiceEndpoint::new("ledger", 8767),
                ServiceEndpoint::new("tracing", 16686),
            ],
        }
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths_default() {
        let endpoint: ServiceEndpoint =
            serde_json::from_str(r#"{"name": "gateway", "port": 8766}"#).unwrap();
        assert_eq!(endpoint.health_path, "/health");
        assert_eq!(endpoint.fallback_path, "/");
    }

    #[test]
    fn test_default_environments_differ() {
        let staging = Environment::default_staging();
        let production = Environment::default_production();
        assert_ne!(staging.network, production.network);
        assert_ne!(staging.stack_name, production.stack_name);
        assert_eq!(staging.service_names(), production.service_names());
    }
}
