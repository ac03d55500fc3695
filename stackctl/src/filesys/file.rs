//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::ReleaseError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, ReleaseError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, ReleaseError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Read file as JSON, or `None` when the file does not exist
    pub async fn read_json_opt<T: DeserializeOwned>(&self) -> Result<Option<T>, ReleaseError> {
        match self.read_string().await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(ReleaseError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write JSON to file, replacing any previous contents
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), ReleaseError> {
        let contents = serde_json::to_string_pretty(value)?;
        self.ensure_parent().await?;

        let mut file = fs::File::create(&self.path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Create the file with owner-only permissions (0o600 on Unix).
    ///
    /// Fails with `AlreadyExists` when the file is present, so callers can
    /// use it as an atomic create-if-absent.
    pub async fn create_private(&self, contents: &[u8]) -> Result<(), ReleaseError> {
        self.ensure_parent().await?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Append a single line, creating the file on first use.
    ///
    /// The file is opened in append mode for every call and never truncated.
    pub async fn append_line(&self, line: &str) -> Result<(), ReleaseError> {
        self.ensure_parent().await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        file.write_all(&buf).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Delete the file
    pub async fn delete(&self) -> Result<(), ReleaseError> {
        if self.exists().await {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    /// Unix permission bits of the file, if available
    #[cfg(unix)]
    pub async fn mode(&self) -> Result<u32, ReleaseError> {
        use std::os::unix::fs::PermissionsExt;
        let meta = fs::metadata(&self.path).await?;
        Ok(meta.permissions().mode() & 0o777)
    }

    async fn ensure_parent(&self) -> Result<(), ReleaseError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_line_keeps_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("nested").join("log.jsonl"));

        file.append_line("first").await.unwrap();
        file.append_line("second").await.unwrap();

        assert_eq!(file.read_string().await.unwrap(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_create_private_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("key.json"));

        file.create_private(b"one").await.unwrap();
        let err = file.create_private(b"two").await.unwrap_err();
        match err {
            ReleaseError::IoError(e) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(file.read_string().await.unwrap(), "one");

        #[cfg(unix)]
        assert_eq!(file.mode().await.unwrap(), 0o600);
    }

    #[tokio::test]
    async fn test_read_json_opt_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("absent.json"));
        let value: Option<serde_json::Value> = file.read_json_opt().await.unwrap();
        assert!(value.is_none());
    }
}
