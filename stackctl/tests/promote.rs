mod common;

use chrono::{Duration, Utc};

use stackctl::controllers::promote::promote;
use stackctl::controllers::report::Terminal;
use stackctl::controllers::rollback;
use stackctl::errors::ReleaseError;
use stackctl::health::prober::ServiceHealth;
use stackctl::models::deployment::{Action, RunStatus};
use stackctl::models::image::{rollback_tag_at, ImageRef};

use common::{day, Harness};

#[tokio::test]
async fn test_healthy_staging_promotes_and_logs_success() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("latest", "v1", day(1)).await;
    h.seed("staging", "v2", day(2)).await;

    let report = promote(&h.context(true).await).await.unwrap();

    assert_eq!(report.terminal, Terminal::Success);
    assert_eq!(report.exit_code(), 0);
    assert!(report.logged);
    let tag = report.tag.clone().unwrap();
    assert!(tag.starts_with("rollback-"));

    for service in ["gateway", "bridge", "ledger"] {
        assert_eq!(h.image_id(service, "latest").await.unwrap(), format!("v2-{}", service));
        assert_eq!(h.image_id(service, &tag).await.unwrap(), format!("v1-{}", service));
    }
    assert_eq!(h.orchestrator.deploy_count(&h.settings.production.stack_name).await, 1);

    let entries = h.log_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, Action::Promote);
    assert_eq!(entries[0].status, RunStatus::Success);
    assert_eq!(entries[0].tag, tag);
    assert_eq!(entries[0].actor, "tester@ci");

    let listed = rollback::list(&h.context(true).await).await.unwrap();
    assert_eq!(listed[0].tag, tag);
}

#[tokio::test]
async fn test_unreachable_staging_fails_before_confirmation() {
    let h = Harness::new();
    h.probe.set(&h.settings.production, ServiceHealth::Healthy);
    h.seed("latest", "v1", day(1)).await;
    h.seed("staging", "v2", day(2)).await;

    let report = promote(&h.context(true).await).await.unwrap();

    assert!(matches!(report.terminal, Terminal::Failed(_)));
    assert_eq!(report.exit_code(), 1);
    assert!(!report.logged);
    assert!(h.log_entries().await.is_empty());
    assert!(h.orchestrator.tag_mutations().await.is_empty());
    assert_eq!(h.orchestrator.deploy_count(&h.settings.production.stack_name).await, 0);
    assert_eq!(h.image_id("gateway", "latest").await.unwrap(), "v1-gateway");
}

#[tokio::test]
async fn test_partially_healthy_staging_is_refused() {
    let h = Harness::new();
    h.all_healthy();
    h.probe.set_port(h.settings.staging.services[1].port, ServiceHealth::Unhealthy);
    h.seed("staging", "v2", day(2)).await;

    let report = promote(&h.context(true).await).await.unwrap();

    match report.terminal {
        Terminal::Failed(reason) => assert!(reason.contains("3/4")),
        other => panic!("unexpected terminal {:?}", other),
    }
    assert!(h.orchestrator.mutations().await.is_empty());
}

#[tokio::test]
async fn test_declined_promotion_is_aborted_without_log() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("latest", "v1", day(1)).await;
    h.seed("staging", "v2", day(2)).await;

    let report = promote(&h.context(false).await).await.unwrap();

    assert_eq!(report.terminal, Terminal::Aborted);
    assert_eq!(report.exit_code(), 0);
    assert!(h.log_entries().await.is_empty());
    assert!(h.orchestrator.mutations().await.is_empty());
}

#[tokio::test]
async fn test_unhealthy_production_is_partial_without_rollback() {
    let h = Harness::new();
    h.probe.set(&h.settings.staging, ServiceHealth::Healthy);
    h.probe.set(&h.settings.production, ServiceHealth::Unhealthy);
    h.seed("latest", "v1", day(1)).await;
    h.seed("staging", "v2", day(2)).await;

    let report = promote(&h.context(true).await).await.unwrap();

    assert_eq!(report.terminal, Terminal::Partial);
    assert_eq!(report.exit_code(), 0);
    // no automatic correction
    assert_eq!(h.image_id("gateway", "latest").await.unwrap(), "v2-gateway");
    let entries = h.log_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, RunStatus::Partial);
}

#[tokio::test]
async fn test_snapshot_collision_fails_without_retag() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("latest", "v1", day(1)).await;
    h.seed("staging", "v2", day(2)).await;
    let now = Utc::now();
    for offset in 0..3 {
        let tag = rollback_tag_at(now + Duration::seconds(offset));
        h.orchestrator
            .add_image(ImageRef::new("gateway-ledger", &tag), "v0-ledger", day(1))
            .await;
    }

    let report = promote(&h.context(true).await).await.unwrap();

    assert!(matches!(report.terminal, Terminal::Failed(_)));
    assert!(report.logged);
    assert!(h.orchestrator.tag_mutations().await.is_empty());
    assert_eq!(h.image_id("gateway", "latest").await.unwrap(), "v1-gateway");
    let entries = h.log_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_older_staging_keeps_production_pointer() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("latest", "v3", day(3)).await;
    h.seed("staging", "v2", day(2)).await;

    let report = promote(&h.context(true).await).await.unwrap();

    assert_eq!(report.terminal, Terminal::Success);
    assert_eq!(h.image_id("gateway", "latest").await.unwrap(), "v3-gateway");
}

#[tokio::test]
async fn test_rollback_pointer_survives_following_promotion() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("latest", "v2", day(2)).await;
    h.seed("staging", "v2", day(2)).await;
    h.seed("rollback-20261001-090000", "v1", day(1)).await;

    let restored = rollback::restore(
        &h.context(true).await,
        "rollback-20261001-090000",
        rollback::RollbackScope::Primary,
    )
    .await
    .unwrap();
    assert_eq!(restored.terminal, Terminal::Success);
    assert_eq!(h.image_id("gateway", "latest").await.unwrap(), "v1-gateway");

    let promoted = promote(&h.context(true).await).await.unwrap();
    let snapshot = promoted.tag.unwrap();

    // staging is newer, so latest moves, but the rolled back pointer is kept
    assert_eq!(h.image_id("gateway", "latest").await.unwrap(), "v2-gateway");
    assert_eq!(h.image_id("gateway", &snapshot).await.unwrap(), "v1-gateway");
    assert_eq!(h.log_entries().await.len(), 2);
}

#[tokio::test]
async fn test_held_lease_blocks_promotion() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("staging", "v2", day(2)).await;
    let holder = h.context(true).await;
    let _lease = holder.acquire_lease(Action::Rollback).await.unwrap();

    let err = promote(&h.context(true).await).await.unwrap_err();

    assert!(matches!(err, ReleaseError::LeaseHeld { .. }));
    assert!(h.orchestrator.mutations().await.is_empty());
    assert!(h.log_entries().await.is_empty());
}

#[tokio::test]
async fn test_first_promotion_logs_latest_without_rollback_point() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("staging", "v1", day(1)).await;

    let report = promote(&h.context(true).await).await.unwrap();

    assert_eq!(report.terminal, Terminal::Success);
    assert_eq!(report.tag, None);
    assert_eq!(report.notes.len(), 3);
    assert_eq!(h.image_id("gateway", "latest").await.unwrap(), "v1-gateway");
    assert!(rollback::list(&h.context(true).await).await.unwrap().is_empty());

    let entries = h.log_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tag, "latest");
    assert_eq!(entries[0].status, RunStatus::Success);
}

#[tokio::test]
async fn test_interrupted_snapshot_records_partial_tag() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("latest", "v1", day(1)).await;
    h.seed("staging", "v2", day(2)).await;
    h.orchestrator.fail_tagging("gateway-bridge").await;

    let report = promote(&h.context(true).await).await.unwrap();

    assert!(matches!(report.terminal, Terminal::Failed(_)));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(h.image_id("gateway", "latest").await.unwrap(), "v1-gateway");
    assert_eq!(h.orchestrator.deploy_count(&h.settings.production.stack_name).await, 0);

    let entries = h.log_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tag, "latest");
    assert_eq!(entries[0].status, RunStatus::Failed);
    let detail = entries[0].detail.as_deref().unwrap();
    assert!(detail.contains("rollback-"));
    assert!(detail.contains("captured [gateway]"));
}

#[tokio::test]
async fn test_unwritable_log_keeps_promotion_report() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("latest", "v1", day(1)).await;
    h.seed("staging", "v2", day(2)).await;
    std::fs::create_dir_all(h.layout().deployment_log_file().path()).unwrap();

    let report = promote(&h.context(true).await).await.unwrap();

    assert_eq!(report.terminal, Terminal::Success);
    assert!(!report.logged);
    assert!(report.tag.clone().unwrap().starts_with("rollback-"));
    assert!(report
        .notes
        .iter()
        .any(|note| note.starts_with("deployment log entry not written")));
    assert_eq!(h.image_id("gateway", "latest").await.unwrap(), "v2-gateway");
}
