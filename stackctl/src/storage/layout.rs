//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::ReleaseError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for stackctl's local state
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Layout from `--state-dir`, `STACKCTL_STATE_DIR`, or the platform default
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        explicit
            .or_else(|| std::env::var_os("STACKCTL_STATE_DIR").map(PathBuf::from))
            .map(Self::new)
            .unwrap_or_default()
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Append-only deployment log
    pub fn deployment_log_file(&self) -> File {
        File::new(self.base_dir.join("deployments.log"))
    }

    /// Directory holding the credential keypair
    pub fn keys_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("keys"))
    }

    /// Credential keypair file
    pub fn keypair_file(&self) -> File {
        self.keys_dir().file("signing.json")
    }

    /// Directory of secret files, one value per file
    pub fn secrets_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("secrets"))
    }

    /// Directory of lease records
    pub fn locks_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("locks"))
    }

    /// Lease held by a mutating run
    pub fn lease_file(&self) -> File {
        self.locks_dir().file("release.lease")
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), ReleaseError> {
        Dir::new(&self.base_dir).create().await?;
        self.keys_dir().create_private().await?;
        self.secrets_dir().create_private().await?;
        self.locks_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/stackctl");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".stackctl");

        Self::new(base_dir)
    }
}
