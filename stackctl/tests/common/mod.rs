#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use stackctl::app::context::AppContext;
use stackctl::confirm::FixedAnswer;
use stackctl::health::prober::{HealthProbe, ServiceHealth};
use stackctl::models::deployment::DeploymentLogEntry;
use stackctl::models::environment::{Environment, ServiceEndpoint};
use stackctl::models::image::ImageRef;
use stackctl::orchestrator::memory::MemoryOrchestrator;
use stackctl::secrets::SecretResolver;
use stackctl::storage::layout::StorageLayout;
use stackctl::storage::settings::Settings;

/// Answers per port, `Unknown` for anything not scripted
#[derive(Default)]
pub struct ScriptedProbe {
    ports: Mutex<HashMap<u16, ServiceHealth>>,
}

impl ScriptedProbe {
    pub fn set(&self, environment: &Environment, health: ServiceHealth) {
        let mut ports = self.ports.lock().unwrap();
        for endpoint in &environment.services {
            ports.insert(endpoint.port, health);
        }
    }

    pub fn set_port(&self, port: u16, health: ServiceHealth) {
        self.ports.lock().unwrap().insert(port, health);
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, _host: &str, endpoint: &ServiceEndpoint) -> ServiceHealth {
        self.ports
            .lock()
            .unwrap()
            .get(&endpoint.port)
            .copied()
            .unwrap_or(ServiceHealth::Unknown)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub settings: Settings,
    pub orchestrator: Arc<MemoryOrchestrator>,
    pub probe: Arc<ScriptedProbe>,
}

impl Harness {
    pub fn new() -> Self {
        let mut settings = Settings::default();
        // one probe round, no waiting
        settings.health.settle_secs = 0;
        settings.health.readiness_timeout_secs = 0;
        settings.health.backoff_base_ms = 1;
        Self {
            dir: tempfile::tempdir().unwrap(),
            settings,
            orchestrator: Arc::new(MemoryOrchestrator::new()),
            probe: Arc::new(ScriptedProbe::default()),
        }
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(self.dir.path())
    }

    pub async fn context(&self, answer: bool) -> AppContext {
        let layout = self.layout();
        let secrets = SecretResolver::new(
            &self.settings.secrets.env_prefix,
            layout.secrets_dir(),
            &self.settings.secrets.bridge_secret,
        )
        .with_env_lookup(|_| None);
        AppContext::new(
            self.settings.clone(),
            layout,
            self.orchestrator.clone(),
            self.probe.clone(),
            Arc::new(FixedAnswer(answer)),
            secrets,
            "tester@ci".to_string(),
        )
        .await
        .unwrap()
    }

    pub fn all_healthy(&self) {
        self.probe.set(&self.settings.staging, ServiceHealth::Healthy);
        self.probe.set(&self.settings.production, ServiceHealth::Healthy);
    }

    /// Give every tracked image `tag` pointing at `<id_prefix>-<service>`
    pub async fn seed(&self, tag: &str, id_prefix: &str, created: DateTime<Utc>) {
        for image in &self.settings.images {
            self.orchestrator
                .add_image(
                    ImageRef::new(&image.repository, tag),
                    &format!("{}-{}", id_prefix, image.service),
                    created,
                )
                .await;
        }
    }

    pub async fn image_id(&self, service: &str, tag: &str) -> Option<String> {
        let image = self
            .settings
            .images
            .iter()
            .find(|image| image.service == service)
            .unwrap();
        self.orchestrator
            .image_id(&ImageRef::new(&image.repository, tag))
            .await
    }

    pub async fn log_entries(&self) -> Vec<DeploymentLogEntry> {
        let ctx = self.context(true).await;
        ctx.log.entries().await.unwrap()
    }
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, d, 9, 0, 0).unwrap()
}
