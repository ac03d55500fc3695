//! `promote`: staging to production.
//!
//! Driven by [`PromotionFsm`]. Nothing in production is touched before
//! the operator confirms, and a rollback point always exists before
//! `latest` moves. Runs that stop before confirmation are never logged;
//! every run past it is logged exactly once.

use chrono::Utc;
use tracing::{info, warn};

use crate::app::context::AppContext;
use crate::controllers::report::{RunReport, Terminal};
use crate::deploy::fsm::{PromotionEvent, PromotionFsm, PromotionState};
use crate::errors::ReleaseError;
use crate::health::prober::AggregateHealth;
use crate::images::tags::TagOutcome;
use crate::models::deployment::{Action, RunStatus};
use crate::models::environment::EnvironmentName;
use crate::models::image::LATEST_TAG;

pub async fn promote(ctx: &AppContext) -> Result<RunReport, ReleaseError> {
    let _lease = ctx.acquire_lease(Action::Promote).await?;
    let mut fsm = PromotionFsm::new();
    let mut report = RunReport::new(Action::Promote, Terminal::Aborted);
    report.services = ctx.settings.tracked_services();

    let executor = ctx.executor();
    let tag_manager = ctx.tag_manager();
    let images = &ctx.settings.images;

    // CHECK_STAGING
    let staging = executor
        .probe(ctx.settings.environment(EnvironmentName::Staging))
        .await;
    let event = match staging.aggregate() {
        AggregateHealth::Healthy => PromotionEvent::StagingHealthy,
        AggregateHealth::Degraded { healthy, total } => {
            PromotionEvent::StagingUnhealthy(format!("staging {}/{} services healthy", healthy, total))
        }
        AggregateHealth::Down => PromotionEvent::StagingUnhealthy(format!(
            "staging 0/{} services healthy",
            staging.services.len()
        )),
    };
    report.health.push((EnvironmentName::Staging, staging));
    step(&mut fsm, event)?;
    if fsm.state() == PromotionState::Failed {
        let reason = fsm.error().unwrap_or("staging unhealthy").to_string();
        warn!(%reason, "promotion refused");
        report.terminal = Terminal::Failed(reason);
        return Ok(report);
    }

    // CONFIRM
    if !ctx
        .confirmer
        .confirm("Staging is healthy. Promote staging images to production?")
        .await
    {
        step(&mut fsm, PromotionEvent::Declined)?;
        info!("promotion declined");
        report.terminal = Terminal::Aborted;
        return Ok(report);
    }
    step(&mut fsm, PromotionEvent::Confirmed)?;

    // SNAPSHOT_ROLLBACK
    match tag_manager.snapshot_rollback(images, Utc::now()).await {
        Ok(snapshot) => {
            for service in &snapshot.skipped {
                report.notes.push(format!("{}: no production image to snapshot", service));
            }
            step(&mut fsm, PromotionEvent::SnapshotTaken(snapshot.record.map(|record| record.tag)))?;
        }
        Err(e) => {
            warn!(error = %e, "rollback snapshot failed, production untouched");
            step(&mut fsm, PromotionEvent::SnapshotFailed(e.to_string()))?;
        }
    }

    if fsm.state() == PromotionState::Retag {
        // RETAG
        report.tags = tag_manager.promote_staging(images).await;
        step(&mut fsm, PromotionEvent::Retagged)?;

        // DEPLOY_PROD, VERIFY_PROD
        let production = ctx.settings.environment(EnvironmentName::Production);
        let outcome = executor.deploy(production, &ctx.runtime).await;
        step(&mut fsm, PromotionEvent::Deployed)?;

        let tag_failed = report
            .tags
            .iter()
            .any(|(_, outcome)| matches!(outcome, TagOutcome::Failed(_)));
        let status = if tag_failed { RunStatus::Partial } else { outcome.status };
        report.notes.extend(outcome.problems);
        report.health.push((EnvironmentName::Production, outcome.report));
        step(&mut fsm, PromotionEvent::Verified(status))?;
    }

    // LOG
    let status = fsm
        .outcome()
        .ok_or_else(|| ReleaseError::Internal("promotion reached LOG without an outcome".to_string()))?;
    let tag = fsm.rollback_tag().unwrap_or(LATEST_TAG).to_string();
    let detail = describe(&fsm, &report);
    let appended = ctx
        .record(Action::Promote, &tag, status, report.services.clone(), detail)
        .await;
    if appended.is_ok() {
        step(&mut fsm, PromotionEvent::Logged)?;
    }
    report.logged_or_note(appended);

    report.tag = fsm.rollback_tag().map(str::to_string);
    report.terminal = match status {
        RunStatus::Success => Terminal::Success,
        RunStatus::Partial => Terminal::Partial,
        RunStatus::Aborted => Terminal::Aborted,
        RunStatus::Failed => Terminal::Failed(fsm.error().unwrap_or("promotion failed").to_string()),
    };
    Ok(report)
}

fn step(fsm: &mut PromotionFsm, event: PromotionEvent) -> Result<(), ReleaseError> {
    fsm.process(event).map_err(ReleaseError::Internal)
}

fn describe(fsm: &PromotionFsm, report: &RunReport) -> Option<String> {
    let mut parts: Vec<String> = report
        .tags
        .iter()
        .map(|(service, outcome)| format!("{}: {}", service, outcome))
        .collect();
    parts.extend(report.notes.iter().cloned());
    if let Some(error) = fsm.error() {
        parts.push(error.to_string());
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}
