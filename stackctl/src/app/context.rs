//! Shared controller context

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::audit::log::DeploymentLog;
use crate::confirm::{Confirmer, FixedAnswer, StdinConfirmer};
use crate::deploy::executor::DeploymentExecutor;
use crate::errors::ReleaseError;
use crate::health::prober::{HealthProbe, HttpProber};
use crate::images::tags::ImageTagManager;
use crate::models::deployment::{Action, DeploymentLogEntry, RunStatus};
use crate::orchestrator::docker::DockerCli;
use crate::orchestrator::Orchestrator;
use crate::secrets::{RuntimeConfig, SecretResolver};
use crate::storage::layout::StorageLayout;
use crate::storage::lease::Lease;
use crate::storage::settings::Settings;
use crate::utils::resolve_actor;

/// Everything a controller run needs, built once per invocation
pub struct AppContext {
    pub settings: Settings,
    pub layout: StorageLayout,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub probe: Arc<dyn HealthProbe>,
    pub confirmer: Arc<dyn Confirmer>,
    pub secrets: SecretResolver,

    /// Secrets resolved at startup, never generated
    pub runtime: RuntimeConfig,

    pub log: DeploymentLog,
    pub actor: String,
}

impl AppContext {
    /// Production wiring: docker CLI, HTTP prober, terminal prompt
    pub async fn init(options: AppOptions, settings: Settings) -> Result<Self, ReleaseError> {
        let orchestrator: Arc<dyn Orchestrator> =
            Arc::new(DockerCli::new(settings.orchestrator.docker_bin.clone()));
        let probe: Arc<dyn HealthProbe> = Arc::new(HttpProber::new(settings.health.probe_timeout())?);
        let confirmer: Arc<dyn Confirmer> = if options.assume_yes {
            Arc::new(FixedAnswer(true))
        } else {
            Arc::new(StdinConfirmer)
        };
        let secrets = SecretResolver::new(
            &settings.secrets.env_prefix,
            options.layout.secrets_dir(),
            &settings.secrets.bridge_secret,
        );
        let actor = resolve_actor(options.actor.as_deref());

        Self::new(settings, options.layout, orchestrator, probe, confirmer, secrets, actor).await
    }

    /// Wire a context from explicit parts
    pub async fn new(
        settings: Settings,
        layout: StorageLayout,
        orchestrator: Arc<dyn Orchestrator>,
        probe: Arc<dyn HealthProbe>,
        confirmer: Arc<dyn Confirmer>,
        secrets: SecretResolver,
        actor: String,
    ) -> Result<Self, ReleaseError> {
        let runtime = RuntimeConfig::load(&secrets, &settings.secrets.required).await?;
        for name in runtime.missing() {
            warn!(
                secret = %name,
                env_var = %secrets.env_var_name(name),
                "required secret is not set, run spin-up or export it"
            );
        }
        let log = DeploymentLog::new(layout.deployment_log_file());

        info!(state_dir = %layout.base_dir.display(), %actor, "context ready");
        Ok(Self {
            settings,
            layout,
            orchestrator,
            probe,
            confirmer,
            secrets,
            runtime,
            log,
            actor,
        })
    }

    pub fn executor(&self) -> DeploymentExecutor {
        DeploymentExecutor::new(
            self.orchestrator.clone(),
            self.probe.clone(),
            self.settings.health.readiness(),
        )
    }

    pub fn tag_manager(&self) -> ImageTagManager {
        ImageTagManager::new(self.orchestrator.clone())
    }

    /// Hold the release lease for the rest of a mutating run
    pub async fn acquire_lease(&self, action: Action) -> Result<Lease, ReleaseError> {
        Lease::acquire(
            self.layout.lease_file(),
            &self.actor,
            action,
            self.settings.lease_ttl(),
        )
        .await
    }

    /// Append one deployment log entry for this run
    pub async fn record(
        &self,
        action: Action,
        tag: &str,
        status: RunStatus,
        services: Vec<String>,
        detail: Option<String>,
    ) -> Result<(), ReleaseError> {
        let entry = DeploymentLogEntry {
            timestamp: Utc::now(),
            actor: self.actor.clone(),
            action,
            tag: tag.to_string(),
            status,
            services,
            detail,
        };
        self.log.append(&entry).await?;
        info!(%action, %status, %tag, "run recorded");
        Ok(())
    }
}
