//! Image Tag Manager
//!
//! Creates, queries and moves the `latest`, `staging` and `rollback-*`
//! references of every tracked image. Tag moves that only prepare a run
//! are best effort: a missing source image is logged and skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::ReleaseError;
use crate::models::environment::EnvironmentName;
use crate::models::image::{rollback_tag_at, ImageRef, TrackedImage, LATEST_TAG, STAGING_TAG};
use crate::models::rollback::RollbackRecord;
use crate::orchestrator::Orchestrator;

/// What happened to one service's tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// Target now points at the source image.
    Tagged,
    /// Target already pointed at the source image.
    Unchanged,
    /// No image under the source reference.
    SourceMissing,
    /// Target holds a newer image than the source and was kept.
    KeptNewer,
    /// The orchestrator refused the tag.
    Failed(String),
}

impl TagOutcome {
    pub fn is_tagged(&self) -> bool {
        matches!(self, TagOutcome::Tagged)
    }
}

impl fmt::Display for TagOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagOutcome::Tagged => f.write_str("tagged"),
            TagOutcome::Unchanged => f.write_str("unchanged"),
            TagOutcome::SourceMissing => f.write_str("source missing"),
            TagOutcome::KeptNewer => f.write_str("kept newer production image"),
            TagOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Recovery point created before a promotion touches `latest`
#[derive(Debug, Clone)]
pub struct RollbackSnapshot {
    /// `None` when no service had a production image to capture
    pub record: Option<RollbackRecord>,

    /// Services whose production image was captured
    pub services: Vec<String>,

    /// Services with no production image to capture
    pub skipped: Vec<String>,
}

pub struct ImageTagManager {
    orchestrator: Arc<dyn Orchestrator>,
}

impl ImageTagManager {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Whether an image exists under `tag` for the tracked image
    pub async fn exists(&self, image: &TrackedImage, tag: &str) -> Result<bool, ReleaseError> {
        let reference = ImageRef::new(&image.repository, tag);
        Ok(self.orchestrator.inspect_image(&reference).await?.is_some())
    }

    /// Tag every service's current production image as `rollback-<at>`.
    ///
    /// All services are checked before anything is written: if the tag is
    /// already taken for any of them the snapshot fails with
    /// `TagCollision` and no tag is created. A tag refused part-way fails
    /// with `SnapshotIncomplete` naming the services already captured.
    pub async fn snapshot_rollback(
        &self,
        images: &[TrackedImage],
        at: DateTime<Utc>,
    ) -> Result<RollbackSnapshot, ReleaseError> {
        let tag = rollback_tag_at(at);

        for image in images {
            if self.exists(image, &tag).await? {
                return Err(ReleaseError::TagCollision {
                    tag,
                    service: image.service.clone(),
                });
            }
        }

        let mut services = Vec::new();
        let mut skipped = Vec::new();
        for image in images {
            let latest = ImageRef::latest(&image.repository);
            if self.orchestrator.inspect_image(&latest).await?.is_none() {
                info!(service = %image.service, "no production image to snapshot");
                skipped.push(image.service.clone());
                continue;
            }
            if let Err(e) = self.orchestrator.tag_image(&latest, &latest.with_tag(&tag)).await {
                warn!(service = %image.service, %tag, error = %e, "rollback snapshot interrupted");
                return Err(ReleaseError::SnapshotIncomplete {
                    tag,
                    captured: services,
                    reason: e.to_string(),
                });
            }
            debug!(service = %image.service, %tag, "rollback snapshot tagged");
            services.push(image.service.clone());
        }

        let record = if services.is_empty() {
            info!("nothing in production yet, no rollback point created");
            None
        } else {
            info!(%tag, captured = services.len(), "rollback snapshot created");
            Some(RollbackRecord {
                tag,
                created_at: at,
                source_environment: EnvironmentName::Production,
            })
        };
        Ok(RollbackSnapshot {
            record,
            services,
            skipped,
        })
    }

    /// Point each service's `latest` at its `staging` image.
    ///
    /// A production image strictly newer than the staging one is kept, so
    /// a pointer set by a rollback is only replaced by a newer candidate.
    pub async fn promote_staging(&self, images: &[TrackedImage]) -> Vec<(String, TagOutcome)> {
        let mut outcomes = Vec::new();
        for image in images {
            let outcome = self.promote_one(image).await;
            match &outcome {
                TagOutcome::Tagged => info!(service = %image.service, "latest now points at staging"),
                TagOutcome::KeptNewer => warn!(
                    service = %image.service,
                    "staging image is older than production, keeping production pointer"
                ),
                TagOutcome::Failed(e) => warn!(service = %image.service, error = %e, "retag failed"),
                other => info!(service = %image.service, outcome = %other, "retag skipped"),
            }
            outcomes.push((image.service.clone(), outcome));
        }
        outcomes
    }

    async fn promote_one(&self, image: &TrackedImage) -> TagOutcome {
        let staging = ImageRef::staging(&image.repository);
        let latest = ImageRef::latest(&image.repository);

        let staging_info = match self.orchestrator.inspect_image(&staging).await {
            Ok(Some(info)) => info,
            Ok(None) => return TagOutcome::SourceMissing,
            Err(e) => return TagOutcome::Failed(e.to_string()),
        };
        let latest_info = match self.orchestrator.inspect_image(&latest).await {
            Ok(info) => info,
            Err(e) => return TagOutcome::Failed(e.to_string()),
        };

        if let Some(current) = latest_info {
            if current.id == staging_info.id {
                return TagOutcome::Unchanged;
            }
            if current.created > staging_info.created {
                return TagOutcome::KeptNewer;
            }
        }

        match self.orchestrator.tag_image(&staging, &latest).await {
            Ok(()) => TagOutcome::Tagged,
            Err(e) => TagOutcome::Failed(e.to_string()),
        }
    }

    /// Point `target_tag` at `<repository>:<source_tag>` for every image.
    /// Best effort: a missing source or a refused tag does not stop the loop.
    pub async fn retag_all(
        &self,
        images: &[TrackedImage],
        source_tag: &str,
        target_tag: &str,
    ) -> Vec<(String, TagOutcome)> {
        let mut outcomes = Vec::new();
        for image in images {
            let source = ImageRef::new(&image.repository, source_tag);
            let target = source.with_tag(target_tag);
            let outcome = match self.orchestrator.inspect_image(&source).await {
                Ok(None) => TagOutcome::SourceMissing,
                Err(e) => TagOutcome::Failed(e.to_string()),
                Ok(Some(_)) => match self.orchestrator.tag_image(&source, &target).await {
                    Ok(()) => TagOutcome::Tagged,
                    Err(e) => TagOutcome::Failed(e.to_string()),
                },
            };
            if outcome.is_tagged() {
                info!(service = %image.service, %source, %target, "image tagged");
            } else {
                info!(service = %image.service, %source, outcome = %outcome, "tag skipped");
            }
            outcomes.push((image.service.clone(), outcome));
        }
        outcomes
    }

    /// Point `staging` at `<repository>:<source_tag>`
    pub async fn stage(&self, images: &[TrackedImage], source_tag: &str) -> Vec<(String, TagOutcome)> {
        self.retag_all(images, source_tag, STAGING_TAG).await
    }

    /// Point `latest` at `<repository>:<rollback_tag>`
    pub async fn restore(&self, images: &[TrackedImage], rollback_tag: &str) -> Vec<(String, TagOutcome)> {
        self.retag_all(images, rollback_tag, LATEST_TAG).await
    }

    /// Every rollback point across the tracked images, newest first
    pub async fn list_rollbacks(&self, images: &[TrackedImage]) -> Result<Vec<RollbackRecord>, ReleaseError> {
        let mut records: BTreeMap<String, RollbackRecord> = BTreeMap::new();
        for image in images {
            let tags = match self.orchestrator.list_tags(&image.repository).await {
                Ok(tags) => tags,
                Err(e) => {
                    warn!(service = %image.service, error = %e, "unable to list tags");
                    continue;
                }
            };
            for tag in tags {
                if let Some(record) = RollbackRecord::from_tag(&tag) {
                    records.entry(tag).or_insert(record);
                }
            }
        }

        let mut records: Vec<RollbackRecord> = records.into_values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.tag.cmp(&a.tag)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::orchestrator::memory::{MemoryOrchestrator, Mutation};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, h, m, s).unwrap()
    }

    fn images() -> Vec<TrackedImage> {
        vec![
            TrackedImage::new("gateway", "registry.local/gateway"),
            TrackedImage::new("bridge", "registry.local/bridge"),
        ]
    }

    async fn seeded() -> (Arc<MemoryOrchestrator>, ImageTagManager) {
        let orchestrator = Arc::new(MemoryOrchestrator::new());
        for image in images() {
            orchestrator
                .add_image(ImageRef::latest(&image.repository), &format!("{}-v1", image.service), at(8, 0, 0))
                .await;
            orchestrator
                .add_image(ImageRef::staging(&image.repository), &format!("{}-v2", image.service), at(9, 0, 0))
                .await;
        }
        let manager = ImageTagManager::new(orchestrator.clone());
        (orchestrator, manager)
    }

    #[tokio::test]
    async fn test_snapshot_collision_detected_before_any_tag() {
        let (orchestrator, manager) = seeded().await;
        let images = images();

        manager.snapshot_rollback(&images, at(10, 0, 0)).await.unwrap();
        let before = orchestrator.tag_mutations().await.len();

        let err = manager.snapshot_rollback(&images, at(10, 0, 0)).await.unwrap_err();
        assert!(matches!(err, ReleaseError::TagCollision { .. }));
        assert_eq!(orchestrator.tag_mutations().await.len(), before);
    }

    #[tokio::test]
    async fn test_promote_keeps_newer_production_image() {
        let (orchestrator, manager) = seeded().await;
        let gateway = TrackedImage::new("gateway", "registry.local/gateway");
        orchestrator
            .add_image(ImageRef::latest(&gateway.repository), "gateway-v3", at(11, 0, 0))
            .await;

        let outcomes = manager.promote_staging(&[gateway.clone()]).await;
        assert_eq!(outcomes, vec![("gateway".to_string(), TagOutcome::KeptNewer)]);
        assert_eq!(
            orchestrator.image_id(&ImageRef::latest(&gateway.repository)).await.as_deref(),
            Some("gateway-v3")
        );
    }

    #[tokio::test]
    async fn test_promote_same_image_is_unchanged() {
        let (orchestrator, manager) = seeded().await;
        let images = images();
        let first = manager.promote_staging(&images).await;
        assert!(first.iter().all(|(_, o)| o.is_tagged()));

        let second = manager.promote_staging(&images).await;
        assert!(second.iter().all(|(_, o)| *o == TagOutcome::Unchanged));
        assert_eq!(orchestrator.tag_mutations().await.len(), 2);
    }

    #[tokio::test]
    async fn test_retag_missing_source_is_skipped() {
        let (orchestrator, manager) = seeded().await;
        let outcomes = manager.stage(&images(), "v9").await;
        assert!(outcomes.iter().all(|(_, o)| *o == TagOutcome::SourceMissing));
        assert!(orchestrator.tag_mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_rollbacks_dedup_newest_first() {
        let (orchestrator, manager) = seeded().await;
        let images = images();
        manager.snapshot_rollback(&images, at(10, 0, 0)).await.unwrap();
        manager.snapshot_rollback(&images, at(12, 30, 0)).await.unwrap();
        // only one service carries the oldest tag
        orchestrator
            .add_image(ImageRef::new("registry.local/gateway", "rollback-20261017-070000"), "old", at(7, 0, 0))
            .await;

        let records = manager.list_rollbacks(&images).await.unwrap();
        let tags: Vec<&str> = records.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(
            tags,
            vec![
                "rollback-20261017-123000",
                "rollback-20261017-100000",
                "rollback-20261017-070000",
            ]
        );
        assert!(orchestrator
            .mutations()
            .await
            .iter()
            .all(|m| matches!(m, Mutation::ImageTagged { .. })));
    }

    #[tokio::test]
    async fn test_snapshot_without_production_images_has_no_record() {
        let orchestrator = Arc::new(MemoryOrchestrator::new());
        let manager = ImageTagManager::new(orchestrator.clone());

        let snapshot = manager.snapshot_rollback(&images(), at(10, 0, 0)).await.unwrap();
        assert!(snapshot.record.is_none());
        assert!(snapshot.services.is_empty());
        assert_eq!(snapshot.skipped, vec!["gateway".to_string(), "bridge".to_string()]);
        assert!(orchestrator.tag_mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_refused_snapshot_tag_names_captured_services() {
        let (orchestrator, manager) = seeded().await;
        orchestrator.fail_tagging("registry.local/bridge").await;

        let err = manager.snapshot_rollback(&images(), at(10, 0, 0)).await.unwrap_err();
        match err {
            ReleaseError::SnapshotIncomplete { tag, captured, .. } => {
                assert_eq!(tag, "rollback-20261017-100000");
                assert_eq!(captured, vec!["gateway".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
