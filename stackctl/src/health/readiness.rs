//! Bounded readiness wait after a deploy.
//!
//! Settle briefly, then poll the environment's aggregate health with
//! exponential backoff until it is healthy or the timeout elapses. A
//! timeout is reported as its own error, separate from an unhealthy probe.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::errors::ReleaseError;
use crate::health::prober::{probe_environment, HealthProbe, HealthReport};
use crate::models::environment::Environment;
use crate::utils::{calc_exp_backoff, CooldownOptions};

#[derive(Debug, Clone)]
pub struct ReadinessOptions {
    /// Wait before the first probe
    pub settle: Duration,

    /// Overall budget, settle included
    pub timeout: Duration,

    /// Delay between polls
    pub backoff: CooldownOptions,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            timeout: Duration::from_secs(45),
            backoff: CooldownOptions::default(),
        }
    }
}

/// Poll until every service of `environment` is healthy.
///
/// Returns the first fully healthy report, or `ReadinessTimeout` carrying
/// the last report seen. At least one probe round always runs.
pub async fn wait_until_healthy(
    probe: &dyn HealthProbe,
    environment: &Environment,
    options: &ReadinessOptions,
) -> Result<HealthReport, ReleaseError> {
    let started = Instant::now();
    let deadline = started + options.timeout;

    if !options.settle.is_zero() {
        info!(
            environment = %environment.name,
            settle_secs = options.settle.as_secs(),
            "waiting for services to settle"
        );
        sleep(options.settle.min(options.timeout)).await;
    }

    let mut attempt: u32 = 0;
    loop {
        let report = probe_environment(probe, environment).await;
        let aggregate = report.aggregate();
        if aggregate.is_healthy() {
            debug!(environment = %environment.name, attempt, "environment healthy");
            return Ok(report);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ReleaseError::ReadinessTimeout {
                environment: environment.name.to_string(),
                waited_secs: now.duration_since(started).as_secs(),
                last_report: report,
            });
        }

        let delay = calc_exp_backoff(&options.backoff, attempt).min(deadline - now);
        debug!(
            environment = %environment.name,
            attempt,
            healthy = report.healthy_count(),
            total = report.services.len(),
            delay_ms = delay.as_millis() as u64,
            "environment not ready yet"
        );
        sleep(delay).await;
        attempt += 1;
    }
}
