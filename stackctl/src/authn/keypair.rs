//! Credential keypair generated once per environment lifetime

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::errors::ReleaseError;
use crate::filesys::file::File;
use crate::orchestrator::EnsureOutcome;

/// Private key length in bytes
pub const PRIVATE_KEY_LEN: usize = 32;

/// Keypair as persisted on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keypair {
    /// Unique key identifier
    pub key_id: Uuid,

    /// Base64 encoded private key
    pub private_key: String,

    /// Hex SHA-256 digest of the private key
    pub public_digest: String,

    pub created_at: DateTime<Utc>,
}

impl Keypair {
    pub fn generate() -> Self {
        let mut private = [0u8; PRIVATE_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut private);
        Self {
            key_id: Uuid::new_v4(),
            private_key: BASE64.encode(private),
            public_digest: public_digest(&private),
            created_at: Utc::now(),
        }
    }

    /// Decode the private key and check it against the stored digest
    pub fn verify(&self) -> Result<(), ReleaseError> {
        let private = BASE64
            .decode(&self.private_key)
            .map_err(|e| ReleaseError::ConfigError(format!("invalid private key encoding: {}", e)))?;
        if private.len() != PRIVATE_KEY_LEN {
            return Err(ReleaseError::ConfigError(format!(
                "private key is {} bytes, expected {}",
                private.len(),
                PRIVATE_KEY_LEN
            )));
        }
        if public_digest(&private) != self.public_digest {
            return Err(ReleaseError::ConfigError("public digest does not match private key".to_string()));
        }
        Ok(())
    }
}

fn public_digest(private: &[u8]) -> String {
    hex::encode(Sha256::digest(private))
}

/// Generate and persist a keypair unless `file` already holds one.
///
/// The file is created owner-only and never overwritten.
pub async fn ensure_keypair(file: &File) -> Result<(EnsureOutcome, Keypair), ReleaseError> {
    if file.exists().await {
        let existing: Keypair = file.read_json().await?;
        existing.verify()?;
        return Ok((EnsureOutcome::AlreadyExists, existing));
    }

    let keypair = Keypair::generate();
    let body = serde_json::to_vec_pretty(&keypair)?;
    match file.create_private(&body).await {
        Ok(()) => {
            info!(key_id = %keypair.key_id, path = %file.path().display(), "generated credential keypair");
            Ok((EnsureOutcome::Created, keypair))
        }
        Err(ReleaseError::IoError(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let existing: Keypair = file.read_json().await?;
            Ok((EnsureOutcome::AlreadyExists, existing))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keypair_verifies() {
        let keypair = Keypair::generate();
        keypair.verify().unwrap();
        assert_eq!(keypair.public_digest.len(), 64);
        assert_ne!(keypair.key_id, Keypair::generate().key_id);
    }

    #[test]
    fn test_tampered_digest_rejected() {
        let mut keypair = Keypair::generate();
        keypair.public_digest = "00".repeat(32);
        assert!(keypair.verify().is_err());
    }

    #[tokio::test]
    async fn test_ensure_keypair_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("keys").join("signing.json"));

        let (first, created) = ensure_keypair(&file).await.unwrap();
        assert_eq!(first, EnsureOutcome::Created);
        let (second, existing) = ensure_keypair(&file).await.unwrap();
        assert_eq!(second, EnsureOutcome::AlreadyExists);
        assert_eq!(created.key_id, existing.key_id);

        #[cfg(unix)]
        assert_eq!(file.mode().await.unwrap(), 0o600);
    }
}
