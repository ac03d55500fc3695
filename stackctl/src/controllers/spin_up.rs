//! `spin-up`: bring a host from nothing to a deployable state.
//!
//! Every step is create-if-absent, so running it again only reports
//! "already exists" for what the first run made.

use std::fmt;

use serde_json::json;
use tracing::{info, warn};

use crate::app::context::AppContext;
use crate::authn::keypair::ensure_keypair;
use crate::controllers::report::{RunReport, Terminal};
use crate::deploy::executor::DeploymentOutcome;
use crate::errors::ReleaseError;
use crate::models::deployment::{Action, RunStatus};
use crate::models::environment::EnvironmentName;
use crate::orchestrator::EnsureOutcome;
use crate::secrets::{RuntimeConfig, SecretSource};

/// Environments deployed after bootstrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpinUpMode {
    StagingOnly,
    ProdOnly,
    #[default]
    All,
}

impl SpinUpMode {
    pub fn environments(&self) -> Vec<EnvironmentName> {
        match self {
            SpinUpMode::StagingOnly => vec![EnvironmentName::Staging],
            SpinUpMode::ProdOnly => vec![EnvironmentName::Production],
            SpinUpMode::All => vec![EnvironmentName::Staging, EnvironmentName::Production],
        }
    }
}

impl fmt::Display for SpinUpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpinUpMode::StagingOnly => f.write_str("staging-only"),
            SpinUpMode::ProdOnly => f.write_str("prod-only"),
            SpinUpMode::All => f.write_str("all"),
        }
    }
}

/// Kind of bootstrapped resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Network,
    Keypair,
    Config,
    Secret,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Network => f.write_str("network"),
            ResourceKind::Keypair => f.write_str("keypair"),
            ResourceKind::Config => f.write_str("config"),
            ResourceKind::Secret => f.write_str("secret"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: EnsureOutcome,
}

#[derive(Debug, Clone)]
pub struct SpinUpReport {
    pub resources: Vec<ResourceOutcome>,
    pub run: RunReport,
}

impl SpinUpReport {
    pub fn exit_code(&self) -> u8 {
        self.run.exit_code()
    }

    pub fn created(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.outcome == EnsureOutcome::Created)
            .count()
    }
}

pub async fn spin_up(ctx: &AppContext, mode: SpinUpMode) -> Result<SpinUpReport, ReleaseError> {
    let _lease = ctx.acquire_lease(Action::SpinUp).await?;
    let mut resources = Vec::new();
    let mut run = RunReport::new(Action::SpinUp, Terminal::Success);
    run.tag = Some(mode.to_string());

    let deployments = match bootstrap(ctx, mode, &mut resources).await {
        Ok(deployments) => deployments,
        Err(e) => {
            warn!(error = %e, "spin-up failed");
            run.terminal = Terminal::Failed(e.to_string());
            let appended = ctx
                .record(Action::SpinUp, &mode.to_string(), RunStatus::Failed, Vec::new(), Some(e.to_string()))
                .await;
            run.logged_or_note(appended);
            return Ok(SpinUpReport { resources, run });
        }
    };

    for outcome in deployments {
        if outcome.status != RunStatus::Success {
            run.terminal = Terminal::Partial;
        }
        let environment = ctx.settings.environment(outcome.environment);
        run.services.extend(environment.service_names());
        run.notes.extend(outcome.problems);
        run.health.push((outcome.environment, outcome.report));
    }

    let detail = (!run.notes.is_empty()).then(|| run.notes.join("; "));
    let appended = ctx
        .record(Action::SpinUp, &mode.to_string(), run.terminal.status(), run.services.clone(), detail)
        .await;
    run.logged_or_note(appended);
    info!(%mode, terminal = %run.terminal, "spin-up finished");
    Ok(SpinUpReport { resources, run })
}

async fn bootstrap(
    ctx: &AppContext,
    mode: SpinUpMode,
    resources: &mut Vec<ResourceOutcome>,
) -> Result<Vec<DeploymentOutcome>, ReleaseError> {
    ctx.layout.setup().await?;

    for environment in [&ctx.settings.staging, &ctx.settings.production] {
        let outcome = ctx.orchestrator.ensure_network(&environment.network).await?;
        info!(network = %environment.network, %outcome, "network");
        resources.push(ResourceOutcome {
            kind: ResourceKind::Network,
            name: environment.network.clone(),
            outcome,
        });
    }

    let keypair_file = ctx.layout.keypair_file();
    let (outcome, keypair) = ensure_keypair(&keypair_file).await?;
    info!(key_id = %keypair.key_id, %outcome, "credential keypair");
    resources.push(ResourceOutcome {
        kind: ResourceKind::Keypair,
        name: keypair_file.path().display().to_string(),
        outcome,
    });

    let config_name = &ctx.settings.secrets.shared_auth_config;
    let body = serde_json::to_vec(&json!({ "profiles": [] }))?;
    let outcome = ctx.orchestrator.ensure_config(config_name, &body).await?;
    info!(config = %config_name, %outcome, "shared auth config");
    resources.push(ResourceOutcome {
        kind: ResourceKind::Config,
        name: config_name.clone(),
        outcome,
    });

    let runtime = RuntimeConfig::bootstrap(&ctx.secrets, &ctx.settings.secrets.required).await?;
    for name in &ctx.settings.secrets.required {
        let outcome = match runtime.source(name) {
            Some(SecretSource::Generated) => EnsureOutcome::Created,
            _ => EnsureOutcome::AlreadyExists,
        };
        resources.push(ResourceOutcome {
            kind: ResourceKind::Secret,
            name: name.clone(),
            outcome,
        });
    }

    let executor = ctx.executor();
    let mut deployments = Vec::new();
    for name in mode.environments() {
        deployments.push(executor.deploy(ctx.settings.environment(name), &runtime).await);
    }
    Ok(deployments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_environments() {
        assert_eq!(SpinUpMode::default(), SpinUpMode::All);
        assert_eq!(SpinUpMode::StagingOnly.environments(), vec![EnvironmentName::Staging]);
        assert_eq!(SpinUpMode::ProdOnly.environments(), vec![EnvironmentName::Production]);
        assert_eq!(SpinUpMode::All.environments().len(), 2);
    }
}
