//! Docker CLI backed orchestrator

use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::ReleaseError;
use crate::models::image::{ImageInfo, ImageRef};
use crate::orchestrator::{EnsureOutcome, Orchestrator};

/// Talks to a swarm manager through the `docker` binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, ReleaseError> {
        self.run_with_env(args, &[]).await
    }

    async fn run_with_env(&self, args: &[&str], env: &[(String, SecretString)]) -> Result<Output, ReleaseError> {
        debug!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .envs(env.iter().map(|(key, value)| (key.as_str(), value.expose_secret())))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ReleaseError::OrchestratorError(format!("Failed to run {}: {}", self.binary, e)))
    }

    async fn run_with_stdin(&self, args: &[&str], input: &[u8]) -> Result<Output, ReleaseError> {
        debug!("{} {} (stdin)", self.binary, args.join(" "));
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReleaseError::OrchestratorError(format!("Failed to run {}: {}", self.binary, e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
        }
        Ok(child.wait_with_output().await?)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn command_failed(what: &str, output: &Output) -> ReleaseError {
    ReleaseError::OrchestratorError(format!("{} failed: {}", what, stderr_of(output)))
}

fn is_already_exists(stderr: &str) -> bool {
    stderr.to_lowercase().contains("already exists")
}

fn is_missing_image(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such image") || stderr.contains("no such object")
}

/// Parse `<id> <created>` as printed by the inspect format below
fn parse_inspect_line(line: &str) -> Option<ImageInfo> {
    let (id, created) = line.trim().split_once(' ')?;
    let created = DateTime::parse_from_rfc3339(created.trim()).ok()?;
    Some(ImageInfo {
        id: id.to_string(),
        created: created.with_timezone(&Utc),
    })
}

#[async_trait]
impl Orchestrator for DockerCli {
    async fn ensure_network(&self, name: &str) -> Result<EnsureOutcome, ReleaseError> {
        let output = self
            .run(&["network", "create", "--driver", "overlay", "--attachable", name])
            .await?;
        if output.status.success() {
            return Ok(EnsureOutcome::Created);
        }
        if is_already_exists(&stderr_of(&output)) {
            return Ok(EnsureOutcome::AlreadyExists);
        }
        Err(command_failed(&format!("network create {}", name), &output))
    }

    async fn deploy_stack(
        &self,
        stack_name: &str,
        stack_file: &Path,
        env: &[(String, SecretString)],
    ) -> Result<(), ReleaseError> {
        if !stack_file.exists() {
            return Err(ReleaseError::ConfigError(format!(
                "Stack file does not exist: {}",
                stack_file.display()
            )));
        }
        let file = stack_file.to_string_lossy();
        // `stack deploy` creates missing services and updates existing ones in place
        let output = self
            .run_with_env(
                &["stack", "deploy", "--with-registry-auth", "--compose-file", &file, stack_name],
                env,
            )
            .await?;
        if !output.status.success() {
            return Err(command_failed(&format!("stack deploy {}", stack_name), &output));
        }
        Ok(())
    }

    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ReleaseError> {
        let source = source.to_string();
        let target = target.to_string();
        let output = self.run(&["image", "tag", &source, &target]).await?;
        if !output.status.success() {
            return Err(command_failed(&format!("tag {} -> {}", source, target), &output));
        }
        Ok(())
    }

    async fn inspect_image(&self, image: &ImageRef) -> Result<Option<ImageInfo>, ReleaseError> {
        let reference = image.to_string();
        let output = self
            .run(&["image", "inspect", "--format", "{{.Id}} {{.Created}}", &reference])
            .await?;
        if !output.status.success() {
            if is_missing_image(&stderr_of(&output)) {
                return Ok(None);
            }
            return Err(command_failed(&format!("image inspect {}", reference), &output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_inspect_line(&stdout).map(Some).ok_or_else(|| {
            ReleaseError::OrchestratorError(format!("Unexpected inspect output for {}: {}", reference, stdout.trim()))
        })
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, ReleaseError> {
        let output = self
            .run(&["image", "ls", repository, "--format", "{{.Tag}}"])
            .await?;
        if !output.status.success() {
            return Err(command_failed(&format!("image ls {}", repository), &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|tag| !tag.is_empty() && *tag != "<none>")
            .map(str::to_string)
            .collect())
    }

    async fn ensure_config(&self, name: &str, body: &[u8]) -> Result<EnsureOutcome, ReleaseError> {
        let inspect = self.run(&["config", "inspect", name]).await?;
        if inspect.status.success() {
            return Ok(EnsureOutcome::AlreadyExists);
        }
        let output = self.run_with_stdin(&["config", "create", name, "-"], body).await?;
        if output.status.success() {
            return Ok(EnsureOutcome::Created);
        }
        // lost a race with another creator
        if is_already_exists(&stderr_of(&output)) {
            return Ok(EnsureOutcome::AlreadyExists);
        }
        Err(command_failed(&format!("config create {}", name), &output))
    }
}
