//! Deployment Executor
//!
//! Ensure the network, apply the stack, wait for readiness, probe. Never
//! fails hard: every deficiency degrades the outcome to `PARTIAL` and the
//! calling controller decides what to do with it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::ReleaseError;
use crate::health::prober::{probe_environment, HealthProbe, HealthReport};
use crate::health::readiness::{wait_until_healthy, ReadinessOptions};
use crate::models::deployment::RunStatus;
use crate::models::environment::{Environment, EnvironmentName};
use crate::orchestrator::{EnsureOutcome, Orchestrator};
use crate::secrets::RuntimeConfig;

/// Result of one deployment
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub environment: EnvironmentName,

    /// Per-service health after the deploy
    pub report: HealthReport,

    /// `Success` or `Partial`
    pub status: RunStatus,

    /// The readiness wait ran out of time
    pub timed_out: bool,

    /// Steps that went wrong, in order
    pub problems: Vec<String>,
}

pub struct DeploymentExecutor {
    orchestrator: Arc<dyn Orchestrator>,
    probe: Arc<dyn HealthProbe>,
    readiness: ReadinessOptions,
}

impl DeploymentExecutor {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        probe: Arc<dyn HealthProbe>,
        readiness: ReadinessOptions,
    ) -> Self {
        Self {
            orchestrator,
            probe,
            readiness,
        }
    }

    /// Probe an environment once, without deploying or waiting
    pub async fn probe(&self, environment: &Environment) -> HealthReport {
        probe_environment(self.probe.as_ref(), environment).await
    }

    /// Apply `environment`'s stack and report its health
    pub async fn deploy(&self, environment: &Environment, config: &RuntimeConfig) -> DeploymentOutcome {
        info!(
            environment = %environment.name,
            stack = %environment.stack_name,
            "deploying stack"
        );
        let mut problems = Vec::new();

        match self.orchestrator.ensure_network(&environment.network).await {
            Ok(EnsureOutcome::Created) => info!(network = %environment.network, "network created"),
            Ok(EnsureOutcome::AlreadyExists) => info!(network = %environment.network, "network already exists"),
            Err(e) => {
                warn!(network = %environment.network, error = %e, "unable to ensure network");
                problems.push(format!("network {}: {}", environment.network, e));
            }
        }

        let deployed = match self
            .orchestrator
            .deploy_stack(&environment.stack_name, &environment.stack_file, &config.stack_env())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(stack = %environment.stack_name, error = %e, "stack deploy failed");
                problems.push(format!("stack {}: {}", environment.stack_name, e));
                false
            }
        };

        let mut timed_out = false;
        let report = if deployed {
            match wait_until_healthy(self.probe.as_ref(), environment, &self.readiness).await {
                Ok(report) => report,
                Err(ReleaseError::ReadinessTimeout {
                    waited_secs,
                    last_report,
                    ..
                }) => {
                    warn!(environment = %environment.name, waited_secs, "readiness wait timed out");
                    timed_out = true;
                    problems.push(format!("not healthy after {}s", waited_secs));
                    last_report
                }
                Err(e) => {
                    problems.push(e.to_string());
                    self.probe(environment).await
                }
            }
        } else {
            // nothing new is starting, report what is running now
            self.probe(environment).await
        };

        let status = if problems.is_empty() && report.aggregate().is_healthy() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };
        info!(
            environment = %environment.name,
            %status,
            healthy = report.healthy_count(),
            total = report.services.len(),
            "deployment finished"
        );

        DeploymentOutcome {
            environment: environment.name,
            report,
            status,
            timed_out,
            problems,
        }
    }
}
