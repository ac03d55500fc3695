//! Layered secret resolution and the runtime configuration built from it.
//!
//! A secret is looked up in the process environment first, then in the
//! secrets directory. Only the bridge secret may be generated, and only
//! when bootstrapping. Resolved values are handed to controllers through
//! [`RuntimeConfig`]; nothing is written back into the process environment.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::errors::ReleaseError;
use crate::filesys::dir::Dir;

/// Where a secret value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Environment,
    SecretsDir,
    Generated,
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Environment => f.write_str("environment"),
            SecretSource::SecretsDir => f.write_str("secrets directory"),
            SecretSource::Generated => f.write_str("generated"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedSecret {
    pub value: SecretString,
    pub source: SecretSource,
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct SecretResolver {
    env_prefix: String,
    secrets_dir: Dir,
    generatable: String,
    env_lookup: EnvLookup,
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretResolver")
            .field("env_prefix", &self.env_prefix)
            .field("secrets_dir", &self.secrets_dir)
            .field("generatable", &self.generatable)
            .finish()
    }
}

impl SecretResolver {
    pub fn new(env_prefix: &str, secrets_dir: Dir, generatable: &str) -> Self {
        Self {
            env_prefix: env_prefix.to_string(),
            secrets_dir,
            generatable: generatable.to_string(),
            env_lookup: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the process environment lookup
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Arc::new(lookup);
        self
    }

    /// `<PREFIX>_<NAME>` in upper case
    pub fn env_var_name(&self, name: &str) -> String {
        format!("{}_{}", self.env_prefix, name).to_uppercase()
    }

    /// Environment, then secrets directory
    pub async fn resolve(&self, name: &str) -> Result<Option<ResolvedSecret>, ReleaseError> {
        let var = self.env_var_name(name);
        if let Some(value) = (self.env_lookup)(&var).filter(|v| !v.is_empty()) {
            debug!(secret = name, env_var = %var, "secret read from environment");
            return Ok(Some(ResolvedSecret {
                value: SecretString::from(value),
                source: SecretSource::Environment,
            }));
        }

        let file = self.secrets_dir.file(name);
        if file.exists().await {
            let value = file.read_string().await?.trim().to_string();
            if !value.is_empty() {
                debug!(secret = name, "secret read from secrets directory");
                return Ok(Some(ResolvedSecret {
                    value: SecretString::from(value),
                    source: SecretSource::SecretsDir,
                }));
            }
            warn!(secret = name, "secret file is empty");
        }

        Ok(None)
    }

    /// Like [`resolve`](Self::resolve), generating and persisting the
    /// bridge secret as a last resort
    pub async fn resolve_or_generate(&self, name: &str) -> Result<ResolvedSecret, ReleaseError> {
        if let Some(secret) = self.resolve(name).await? {
            return Ok(secret);
        }
        if name != self.generatable {
            return Err(ReleaseError::SecretError(format!(
                "{} is not set: export {} or write {}",
                name,
                self.env_var_name(name),
                self.secrets_dir.file(name).path().display()
            )));
        }

        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let value = hex::encode(bytes);

        self.secrets_dir.create_private().await?;
        let file = self.secrets_dir.file(name);
        match file.create_private(value.as_bytes()).await {
            Ok(()) => {}
            // someone else generated it in the meantime
            Err(ReleaseError::IoError(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return self.resolve(name).await?.ok_or_else(|| {
                    ReleaseError::SecretError(format!("{} exists but is empty", name))
                });
            }
            Err(e) => return Err(e),
        }
        info!(secret = name, path = %file.path().display(), "generated secret");
        Ok(ResolvedSecret {
            value: SecretString::from(value),
            source: SecretSource::Generated,
        })
    }
}

/// Secrets resolved for this invocation
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    secrets: BTreeMap<String, ResolvedSecret>,
    missing: Vec<String>,
}

impl RuntimeConfig {
    /// Resolve `required` without generating anything; unresolved names
    /// are remembered in [`missing`](Self::missing)
    pub async fn load(resolver: &SecretResolver, required: &[String]) -> Result<Self, ReleaseError> {
        let mut config = RuntimeConfig::default();
        for name in required {
            match resolver.resolve(name).await? {
                Some(secret) => {
                    config.secrets.insert(name.clone(), secret);
                }
                None => config.missing.push(name.clone()),
            }
        }
        Ok(config)
    }

    /// Resolve `required`, generating the bridge secret if needed. Fails on
    /// the first secret that cannot be provided.
    pub async fn bootstrap(resolver: &SecretResolver, required: &[String]) -> Result<Self, ReleaseError> {
        let mut config = RuntimeConfig::default();
        for name in required {
            let secret = resolver.resolve_or_generate(name).await?;
            config.secrets.insert(name.clone(), secret);
        }
        Ok(config)
    }

    pub fn get(&self, name: &str) -> Option<&SecretString> {
        self.secrets.get(name).map(|secret| &secret.value)
    }

    pub fn source(&self, name: &str) -> Option<SecretSource> {
        self.secrets.get(name).map(|secret| secret.source)
    }

    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    /// Variables a stack file interpolates, `BRIDGE_TOKEN=...` style
    pub fn stack_env(&self) -> Vec<(String, SecretString)> {
        self.secrets
            .iter()
            .map(|(name, secret)| {
                (
                    name.to_uppercase(),
                    SecretString::from(secret.value.expose_secret().to_string()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(dir: &std::path::Path, env: &'static [(&'static str, &'static str)]) -> SecretResolver {
        SecretResolver::new("STACKCTL", Dir::new(dir.join("secrets")), "bridge_token").with_env_lookup(
            move |key| {
                env.iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            },
        )
    }

    #[tokio::test]
    async fn test_environment_beats_secrets_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path(), &[("STACKCTL_LEDGER_KEY", "from-env")]);
        Dir::new(dir.path().join("secrets"))
            .file("ledger_key")
            .create_private(b"from-file\n")
            .await
            .unwrap();

        let secret = resolver.resolve("ledger_key").await.unwrap().unwrap();
        assert_eq!(secret.source, SecretSource::Environment);
        assert_eq!(secret.value.expose_secret(), "from-env");
    }

    #[tokio::test]
    async fn test_secrets_dir_value_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path(), &[]);
        Dir::new(dir.path().join("secrets"))
            .file("ledger_key")
            .create_private(b"from-file\n")
            .await
            .unwrap();

        let secret = resolver.resolve("ledger_key").await.unwrap().unwrap();
        assert_eq!(secret.source, SecretSource::SecretsDir);
        assert_eq!(secret.value.expose_secret(), "from-file");
    }

    #[tokio::test]
    async fn test_only_bridge_secret_is_generated_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path(), &[]);

        let err = resolver.resolve_or_generate("ledger_key").await.unwrap_err();
        assert!(matches!(err, ReleaseError::SecretError(_)));

        let generated = resolver.resolve_or_generate("bridge_token").await.unwrap();
        assert_eq!(generated.source, SecretSource::Generated);
        assert_eq!(generated.value.expose_secret().len(), 64);

        let again = resolver.resolve_or_generate("bridge_token").await.unwrap();
        assert_eq!(again.source, SecretSource::SecretsDir);
        assert_eq!(again.value.expose_secret(), generated.value.expose_secret());
    }

    #[tokio::test]
    async fn test_load_records_missing() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path(), &[("STACKCTL_BRIDGE_TOKEN", "t0k")]);
        let config = RuntimeConfig::load(&resolver, &["bridge_token".to_string(), "ledger_key".to_string()])
            .await
            .unwrap();
        assert_eq!(config.missing(), &["ledger_key".to_string()]);
        let env = config.stack_env();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].0, "BRIDGE_TOKEN");
    }
}
