//! `rollback [tag|list]`

use std::fmt;

use tracing::{info, warn};

use crate::app::context::AppContext;
use crate::controllers::report::{deployment_terminal, RunReport, Terminal};
use crate::errors::ReleaseError;
use crate::models::deployment::Action;
use crate::models::environment::EnvironmentName;
use crate::models::image::{parse_rollback_tag, TrackedImage};
use crate::models::rollback::RollbackRecord;

/// Which services a restore moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackScope {
    /// The primary service only
    #[default]
    Primary,
    /// Every tracked service that has the tag
    All,
}

impl fmt::Display for RollbackScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackScope::Primary => f.write_str("primary"),
            RollbackScope::All => f.write_str("all"),
        }
    }
}

/// Every rollback point, newest first. Read only.
pub async fn list(ctx: &AppContext) -> Result<Vec<RollbackRecord>, ReleaseError> {
    ctx.tag_manager().list_rollbacks(&ctx.settings.images).await
}

/// Point production back at `tag` and redeploy it
pub async fn restore(ctx: &AppContext, tag: &str, scope: RollbackScope) -> Result<RunReport, ReleaseError> {
    let mut report = RunReport::new(Action::Rollback, Terminal::NotFound(tag.to_string()));
    report.tag = Some(tag.to_string());

    // only snapshots taken by a promotion are recovery points
    if parse_rollback_tag(tag).is_none() {
        warn!(%tag, "not a rollback tag");
        report.notes.push(format!("{} is not a rollback tag", tag));
        return Ok(report);
    }

    let _lease = ctx.acquire_lease(Action::Rollback).await?;
    let tag_manager = ctx.tag_manager();

    let primary = ctx.settings.primary_image().ok_or_else(|| {
        ReleaseError::ConfigError(format!(
            "primary service {} is not a tracked image",
            ctx.settings.primary_service
        ))
    })?;
    if !tag_manager.exists(primary, tag).await? {
        warn!(%tag, service = %primary.service, "no rollback image for primary service");
        return Ok(report);
    }

    let targets: Vec<TrackedImage> = match scope {
        RollbackScope::Primary => vec![primary.clone()],
        RollbackScope::All => {
            let mut targets = Vec::new();
            for image in &ctx.settings.images {
                if tag_manager.exists(image, tag).await? {
                    targets.push(image.clone());
                } else {
                    report.notes.push(format!("{}: no image under {}", image.service, tag));
                }
            }
            targets
        }
    };
    report.services = targets.iter().map(|image| image.service.clone()).collect();

    let prompt = format!(
        "Restore production {} to {}?",
        report.services.join(", "),
        tag
    );
    if !ctx.confirmer.confirm(&prompt).await {
        info!("rollback declined");
        report.terminal = Terminal::Aborted;
        return Ok(report);
    }

    info!(%tag, %scope, services = ?report.services, "restoring rollback point");
    report.tags = tag_manager.restore(&targets, tag).await;

    let production = ctx.settings.environment(EnvironmentName::Production);
    let outcome = ctx.executor().deploy(production, &ctx.runtime).await;
    report.notes.extend(outcome.problems);
    report.health.push((EnvironmentName::Production, outcome.report));
    report.terminal = deployment_terminal(outcome.status, &report.tags);

    let mut detail: Vec<String> = vec![format!("scope: {}", scope)];
    detail.extend(
        report
            .tags
            .iter()
            .map(|(service, outcome)| format!("{}: {}", service, outcome)),
    );
    detail.extend(report.notes.iter().cloned());
    let appended = ctx
        .record(
            Action::Rollback,
            tag,
            report.terminal.status(),
            report.services.clone(),
            Some(detail.join("; ")),
        )
        .await;
    report.logged_or_note(appended);
    Ok(report)
}
