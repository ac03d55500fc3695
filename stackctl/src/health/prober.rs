//! Health probe logic.
//!
//! One GET against the primary health path, one GET against the fallback
//! path when the first does not answer 2xx. No further retries.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::ReleaseError;
use crate::models::environment::{Environment, ServiceEndpoint};

/// Result of probing a single service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    /// Primary or fallback path answered 2xx.
    Healthy,
    /// The service answered, but never with 2xx.
    Unhealthy,
    /// Neither attempt got an HTTP response.
    Unknown,
}

impl fmt::Display for ServiceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceHealth::Healthy => f.write_str("healthy"),
            ServiceHealth::Unhealthy => f.write_str("unhealthy"),
            ServiceHealth::Unknown => f.write_str("unknown"),
        }
    }
}

/// Reduction of a [`HealthReport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateHealth {
    /// Every service healthy.
    Healthy,
    /// Some but not all services healthy.
    Degraded { healthy: usize, total: usize },
    /// No service healthy, or nothing was probed.
    Down,
}

impl AggregateHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, AggregateHealth::Healthy)
    }
}

/// Per-service results for one environment, in probe order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub services: Vec<(String, ServiceHealth)>,
}

impl HealthReport {
    pub fn push(&mut self, service: &str, health: ServiceHealth) {
        self.services.push((service.to_string(), health));
    }

    pub fn get(&self, service: &str) -> Option<ServiceHealth> {
        self.services
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, health)| *health)
    }

    pub fn healthy_count(&self) -> usize {
        self.services
            .iter()
            .filter(|(_, health)| *health == ServiceHealth::Healthy)
            .count()
    }

    /// Only `Healthy` counts as a pass; `Unknown` is never optimistic.
    pub fn aggregate(&self) -> AggregateHealth {
        let total = self.services.len();
        let healthy = self.healthy_count();
        if total > 0 && healthy == total {
            AggregateHealth::Healthy
        } else if healthy > 0 {
            AggregateHealth::Degraded { healthy, total }
        } else {
            AggregateHealth::Down
        }
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Single-attempt reachability check of one service
    async fn probe(&self, host: &str, endpoint: &ServiceEndpoint) -> ServiceHealth;
}

/// Probe every service of an environment, one after the other
pub async fn probe_environment(probe: &dyn HealthProbe, environment: &Environment) -> HealthReport {
    let mut report = HealthReport::default();
    for endpoint in &environment.services {
        let health = probe.probe(&environment.host, endpoint).await;
        debug!(
            environment = %environment.name,
            service = %endpoint.name,
            %health,
            "probed service"
        );
        report.push(&endpoint.name, health);
    }
    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Success,
    NonSuccess,
    NoResponse,
}

/// reqwest backed prober
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(request_timeout: Duration) -> Result<Self, ReleaseError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("stackctl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn attempt(&self, host: &str, port: u16, path: &str) -> Attempt {
        let url = match endpoint_url(host, port, path) {
            Some(url) => url,
            None => {
                debug!(host, port, path, "unusable health probe address");
                return Attempt::NoResponse;
            }
        };

        match self.client.get(url.clone()).send().await {
            Ok(response) if response.status().is_success() => Attempt::Success,
            Ok(response) => {
                debug!(status = %response.status(), %url, "health probe non-2xx");
                Attempt::NonSuccess
            }
            Err(e) => {
                debug!(error = %e, %url, "health probe failed");
                Attempt::NoResponse
            }
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProber {
    async fn probe(&self, host: &str, endpoint: &ServiceEndpoint) -> ServiceHealth {
        let primary = self.attempt(host, endpoint.port, &endpoint.health_path).await;
        if primary == Attempt::Success {
            return ServiceHealth::Healthy;
        }

        let fallback = self.attempt(host, endpoint.port, &endpoint.fallback_path).await;
        match (primary, fallback) {
            (_, Attempt::Success) => ServiceHealth::Healthy,
            (Attempt::NoResponse, Attempt::NoResponse) => ServiceHealth::Unknown,
            _ => ServiceHealth::Unhealthy,
        }
    }
}

fn endpoint_url(host: &str, port: u16, path: &str) -> Option<Url> {
    let base = Url::parse(&format!("http://{}:{}/", host, port)).ok()?;
    base.join(path).ok()
}
