//! In-memory orchestrator.
//!
//! Keeps networks, stacks, images and config objects in process memory and
//! records every mutating call so tests can assert on what a controller did.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::errors::ReleaseError;
use crate::models::image::{ImageInfo, ImageRef};
use crate::orchestrator::{EnsureOutcome, Orchestrator};

/// A mutating call observed by the in-memory orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    NetworkCreated(String),
    StackDeployed(String),
    ImageTagged { source: String, target: String },
    ConfigCreated(String),
}

#[derive(Debug, Default)]
struct State {
    networks: BTreeSet<String>,
    stacks: BTreeMap<String, u32>,
    stack_env_keys: BTreeMap<String, Vec<String>>,
    images: HashMap<ImageRef, ImageInfo>,
    configs: BTreeMap<String, Vec<u8>>,
    failing_stacks: BTreeSet<String>,
    failing_repositories: BTreeSet<String>,
    journal: Vec<Mutation>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryOrchestrator {
    state: Arc<RwLock<State>>,
}

impl MemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an image without recording a mutation
    pub async fn add_image(&self, image: ImageRef, id: &str, created: DateTime<Utc>) {
        let info = ImageInfo {
            id: id.to_string(),
            created,
        };
        self.state.write().await.images.insert(image, info);
    }

    /// Make every deploy of `stack_name` fail
    pub async fn fail_stack(&self, stack_name: &str) {
        self.state.write().await.failing_stacks.insert(stack_name.to_string());
    }

    /// Refuse every tag whose target is in `repository`
    pub async fn fail_tagging(&self, repository: &str) {
        self.state
            .write()
            .await
            .failing_repositories
            .insert(repository.to_string());
    }

    /// Image id a reference currently points at
    pub async fn image_id(&self, image: &ImageRef) -> Option<String> {
        self.state.read().await.images.get(image).map(|info| info.id.clone())
    }

    pub async fn has_network(&self, name: &str) -> bool {
        self.state.read().await.networks.contains(name)
    }

    pub async fn config(&self, name: &str) -> Option<Vec<u8>> {
        self.state.read().await.configs.get(name).cloned()
    }

    /// How many times a stack was applied
    pub async fn deploy_count(&self, stack_name: &str) -> u32 {
        self.state.read().await.stacks.get(stack_name).copied().unwrap_or(0)
    }

    /// Variable names passed to the last deploy of a stack
    pub async fn stack_env_keys(&self, stack_name: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .stack_env_keys
            .get(stack_name)
            .cloned()
            .unwrap_or_default()
    }

    /// All mutating calls in order
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.read().await.journal.clone()
    }

    /// Tag mutations only
    pub async fn tag_mutations(&self) -> Vec<Mutation> {
        self.mutations()
            .await
            .into_iter()
            .filter(|m| matches!(m, Mutation::ImageTagged { .. }))
            .collect()
    }
}

#[async_trait]
impl Orchestrator for MemoryOrchestrator {
    async fn ensure_network(&self, name: &str) -> Result<EnsureOutcome, ReleaseError> {
        let mut state = self.state.write().await;
        if !state.networks.insert(name.to_string()) {
            return Ok(EnsureOutcome::AlreadyExists);
        }
        state.journal.push(Mutation::NetworkCreated(name.to_string()));
        Ok(EnsureOutcome::Created)
    }

    async fn deploy_stack(
        &self,
        stack_name: &str,
        _stack_file: &Path,
        env: &[(String, SecretString)],
    ) -> Result<(), ReleaseError> {
        let mut state = self.state.write().await;
        if state.failing_stacks.contains(stack_name) {
            return Err(ReleaseError::OrchestratorError(format!(
                "stack deploy {} failed",
                stack_name
            )));
        }
        *state.stacks.entry(stack_name.to_string()).or_insert(0) += 1;
        state.stack_env_keys.insert(
            stack_name.to_string(),
            env.iter().map(|(key, _)| key.clone()).collect(),
        );
        state.journal.push(Mutation::StackDeployed(stack_name.to_string()));
        Ok(())
    }

    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ReleaseError> {
        let mut state = self.state.write().await;
        if state.failing_repositories.contains(&target.repository) {
            return Err(ReleaseError::OrchestratorError(format!(
                "tag {} refused",
                target
            )));
        }
        let info = state
            .images
            .get(source)
            .cloned()
            .ok_or_else(|| ReleaseError::NotFound(format!("No such image: {}", source)))?;
        state.images.insert(target.clone(), info);
        state.journal.push(Mutation::ImageTagged {
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    async fn inspect_image(&self, image: &ImageRef) -> Result<Option<ImageInfo>, ReleaseError> {
        Ok(self.state.read().await.images.get(image).cloned())
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, ReleaseError> {
        let state = self.state.read().await;
        let mut tags: Vec<String> = state
            .images
            .keys()
            .filter(|image| image.repository == repository)
            .map(|image| image.tag.clone())
            .collect();
        tags.sort();
        Ok(tags)
    }

    async fn ensure_config(&self, name: &str, body: &[u8]) -> Result<EnsureOutcome, ReleaseError> {
        let mut state = self.state.write().await;
        if state.configs.contains_key(name) {
            return Ok(EnsureOutcome::AlreadyExists);
        }
        state.configs.insert(name.to_string(), body.to_vec());
        state.journal.push(Mutation::ConfigCreated(name.to_string()));
        Ok(EnsureOutcome::Created)
    }
}
