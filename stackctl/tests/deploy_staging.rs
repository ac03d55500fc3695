mod common;

use stackctl::controllers::deploy_staging::deploy_staging;
use stackctl::controllers::report::Terminal;
use stackctl::health::prober::ServiceHealth;
use stackctl::models::deployment::{Action, RunStatus};

use common::{day, Harness};

#[tokio::test]
async fn test_stages_tag_and_deploys() {
    let h = Harness::new();
    h.all_healthy();
    h.seed("v5", "v5", day(5)).await;

    let report = deploy_staging(&h.context(true).await, Some("v5")).await.unwrap();

    assert_eq!(report.terminal, Terminal::Success);
    assert_eq!(h.image_id("ledger", "staging").await.unwrap(), "v5-ledger");
    assert_eq!(h.orchestrator.deploy_count(&h.settings.staging.stack_name).await, 1);
    assert_eq!(h.orchestrator.deploy_count(&h.settings.production.stack_name).await, 0);
    assert!(h.orchestrator.has_network(&h.settings.staging.network).await);

    let entries = h.log_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, Action::DeployStaging);
    assert_eq!(entries[0].tag, "v5");
}

#[tokio::test]
async fn test_unhealthy_staging_is_partial_not_failed() {
    let h = Harness::new();
    h.probe.set(&h.settings.staging, ServiceHealth::Unhealthy);

    let report = deploy_staging(&h.context(true).await, None).await.unwrap();

    assert_eq!(report.terminal, Terminal::Partial);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(h.log_entries().await[0].status, RunStatus::Partial);
}

#[tokio::test]
async fn test_missing_source_tag_is_skipped() {
    let h = Harness::new();
    h.all_healthy();

    let report = deploy_staging(&h.context(true).await, Some("nope")).await.unwrap();

    assert_eq!(report.terminal, Terminal::Success);
    assert!(h.orchestrator.tag_mutations().await.is_empty());
    assert_eq!(report.tags.len(), 3);
}
