//! Cross-invocation lease.
//!
//! A mutating run holds `locks/release.lease` for its whole duration. The
//! file is created with exclusive-create semantics so only one run can
//! hold it; a lease past its expiry is taken over.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ReleaseError;
use crate::filesys::file::File;
use crate::models::deployment::Action;

/// Contents of the lease file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub token: Uuid,
    pub holder: String,
    pub action: Action,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A held lease, released on drop
#[derive(Debug)]
pub struct Lease {
    file: File,
    record: LeaseRecord,
}

impl Lease {
    /// Acquire the lease or fail with `LeaseHeld`
    pub async fn acquire(
        file: File,
        holder: &str,
        action: Action,
        ttl: Duration,
    ) -> Result<Lease, ReleaseError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| ReleaseError::ConfigError(format!("invalid lease ttl: {}", e)))?;
        let record = LeaseRecord {
            token: Uuid::new_v4(),
            holder: holder.to_string(),
            action,
            acquired_at: now,
            expires_at: now + ttl,
        };
        let body = serde_json::to_vec_pretty(&record)?;

        // second attempt only after removing an expired lease
        for _ in 0..2 {
            match file.create_private(&body).await {
                Ok(()) => {
                    debug!(holder, %action, "lease acquired");
                    return Ok(Lease { file, record });
                }
                Err(ReleaseError::IoError(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let current = read_record(&file).await?;
                    if current.expires_at > now {
                        return Err(held(current));
                    }
                    take_over(&file, &current).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Err(ReleaseError::Internal("lease contended during takeover".to_string()))
    }

    pub fn record(&self) -> &LeaseRecord {
        &self.record
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // only remove the file if it is still ours
        let ours = std::fs::read(self.file.path())
            .ok()
            .and_then(|bytes| serde_json::from_slice::<LeaseRecord>(&bytes).ok())
            .map(|current| current.token == self.record.token)
            .unwrap_or(false);
        if ours {
            if let Err(e) = std::fs::remove_file(self.file.path()) {
                warn!(error = %e, "failed to release lease");
            } else {
                debug!("lease released");
            }
        }
    }
}

async fn read_record(file: &File) -> Result<LeaseRecord, ReleaseError> {
    file.read_json::<LeaseRecord>().await.map_err(|e| {
        ReleaseError::ConfigError(format!(
            "unreadable lease file {}: {}",
            file.path().display(),
            e
        ))
    })
}

fn held(current: LeaseRecord) -> ReleaseError {
    ReleaseError::LeaseHeld {
        holder: current.holder,
        action: current.action.to_string(),
        expires_at: current.expires_at.to_rfc3339(),
    }
}

/// Marker claimed by the one run allowed to remove the stale lease `token`
fn takeover_marker(file: &File, token: &Uuid) -> File {
    let mut name = file.path().as_os_str().to_owned();
    name.push(format!(".{}.takeover", token));
    File::new(name)
}

/// Remove an expired lease so the caller can retry the exclusive create.
///
/// Only the run that creates the marker for the stale token may delete the
/// lease file, and only while that token is still on disk. Everyone else
/// backs off and re-reads.
async fn take_over(file: &File, stale: &LeaseRecord) -> Result<(), ReleaseError> {
    let marker = takeover_marker(file, &stale.token);
    match marker.create_private(stale.holder.as_bytes()).await {
        Ok(()) => {}
        Err(ReleaseError::IoError(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            debug!(marker = %marker.path().display(), "lease takeover already claimed");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    let result = remove_if_unchanged(file, stale).await;

    if let Err(e) = marker.delete().await {
        warn!(error = %e, marker = %marker.path().display(), "failed to remove takeover marker");
    }
    result
}

async fn remove_if_unchanged(file: &File, stale: &LeaseRecord) -> Result<(), ReleaseError> {
    match file.read_json_opt::<LeaseRecord>().await? {
        Some(current) if current.token == stale.token => {
            warn!(
                previous_holder = %stale.holder,
                expired_at = %stale.expires_at,
                "taking over expired lease"
            );
            file.delete().await
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("release.lease"));

        let lease = Lease::acquire(file.clone(), "alice@host", Action::Promote, Duration::from_secs(60))
            .await
            .unwrap();
        let err = Lease::acquire(file.clone(), "bob@host", Action::Rollback, Duration::from_secs(60))
            .await
            .unwrap_err();
        match err {
            ReleaseError::LeaseHeld { holder, action, .. } => {
                assert_eq!(holder, "alice@host");
                assert_eq!(action, "PROMOTE");
            }
            other => panic!("unexpected error: {other}"),
        }

        drop(lease);
        assert!(!file.exists().await);
        Lease::acquire(file, "bob@host", Action::Rollback, Duration::from_secs(60))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("release.lease"));
        let stale = LeaseRecord {
            token: Uuid::new_v4(),
            holder: "crashed@host".to_string(),
            action: Action::Promote,
            acquired_at: Utc::now() - chrono::Duration::hours(2),
            expires_at: Utc::now() - chrono::Duration::hours(1),
        };
        file.write_json(&stale).await.unwrap();

        let lease = Lease::acquire(file.clone(), "ops@host", Action::Promote, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(lease.record().holder, "ops@host");
        let on_disk: LeaseRecord = file.read_json().await.unwrap();
        assert_eq!(on_disk.token, lease.record().token);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_takeover_grants_one_holder() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("release.lease"));

        for round in 0..200 {
            let stale = LeaseRecord {
                token: Uuid::new_v4(),
                holder: "crashed@host".to_string(),
                action: Action::Promote,
                acquired_at: Utc::now() - chrono::Duration::hours(2),
                expires_at: Utc::now() - chrono::Duration::hours(1),
            };
            file.write_json(&stale).await.unwrap();

            let a = tokio::spawn(Lease::acquire(
                file.clone(),
                "alice@host",
                Action::Promote,
                Duration::from_secs(60),
            ));
            let b = tokio::spawn(Lease::acquire(
                file.clone(),
                "bob@host",
                Action::Rollback,
                Duration::from_secs(60),
            ));
            let (a, b) = (a.await.unwrap(), b.await.unwrap());

            let granted: Vec<&Lease> = [a.as_ref().ok(), b.as_ref().ok()].into_iter().flatten().collect();
            assert_eq!(granted.len(), 1, "round {round}: {a:?} / {b:?}");
            let on_disk: LeaseRecord = file.read_json().await.unwrap();
            assert_eq!(on_disk.token, granted[0].record().token);

            drop(a);
            drop(b);
            assert!(!file.exists().await);
        }

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
