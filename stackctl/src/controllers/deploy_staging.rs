//! `deploy-staging [image-tag]`

use tracing::info;

use crate::app::context::AppContext;
use crate::controllers::report::{deployment_terminal, RunReport};
use crate::errors::ReleaseError;
use crate::models::deployment::Action;
use crate::models::environment::EnvironmentName;
use crate::models::image::STAGING_TAG;

/// Optionally point `staging` at `image_tag`, then deploy staging
pub async fn deploy_staging(ctx: &AppContext, image_tag: Option<&str>) -> Result<RunReport, ReleaseError> {
    let _lease = ctx.acquire_lease(Action::DeployStaging).await?;
    let images = &ctx.settings.images;

    let tags = match image_tag {
        Some(tag) => {
            info!(%tag, "staging image tag");
            ctx.tag_manager().stage(images, tag).await
        }
        None => Vec::new(),
    };

    let staging = ctx.settings.environment(EnvironmentName::Staging);
    let outcome = ctx.executor().deploy(staging, &ctx.runtime).await;

    let terminal = deployment_terminal(outcome.status, &tags);
    let tag = image_tag.unwrap_or(STAGING_TAG).to_string();
    let services = staging.service_names();
    let detail = (!outcome.problems.is_empty()).then(|| outcome.problems.join("; "));
    let appended = ctx
        .record(Action::DeployStaging, &tag, terminal.status(), services.clone(), detail)
        .await;

    let mut report = RunReport::new(Action::DeployStaging, terminal);
    report.tag = Some(tag);
    report.services = services;
    report.health.push((EnvironmentName::Staging, outcome.report));
    report.tags = tags;
    report.notes = outcome.problems;
    report.logged_or_note(appended);
    Ok(report)
}
