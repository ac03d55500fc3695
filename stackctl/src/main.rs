//! stackctl - Entry Point
//!
//! Release controller for the gateway stack: staging deploys, promotion to
//! production, rollback and host bootstrap.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{error, warn};

use stackctl::app::context::AppContext;
use stackctl::app::options::AppOptions;
use stackctl::audit::log::DeploymentLog;
use stackctl::controllers::report::{RunReport, Terminal};
use stackctl::controllers::rollback::{self, RollbackScope};
use stackctl::controllers::spin_up::{spin_up, SpinUpMode, SpinUpReport};
use stackctl::controllers::{deploy_staging::deploy_staging, promote::promote};
use stackctl::errors::ReleaseError;
use stackctl::health::prober::{HealthReport, ServiceHealth};
use stackctl::logs::{init_logging, LogLevel, LogOptions};
use stackctl::models::environment::EnvironmentName;
use stackctl::models::rollback::RollbackRecord;
use stackctl::orchestrator::EnsureOutcome;
use stackctl::storage::settings::Settings;
use stackctl::utils::version_info;

#[derive(Parser)]
#[command(
    name = "stackctl",
    about = "Staging/production release controller for the gateway stack",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// State directory (settings, deployment log, keys, secrets, lease)
    #[arg(long, global = true, env = "STACKCTL_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// JSON logs on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Identity recorded in the deployment log
    #[arg(long, global = true)]
    actor: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the staging stack, optionally staging an image tag first
    DeployStaging {
        /// Existing tag to point `staging` at
        image_tag: Option<String>,
    },
    /// Promote the staging images to production
    Promote,
    /// List rollback points, or restore one
    Rollback {
        /// Rollback tag to restore, or `list`
        target: Option<String>,
        /// Restore every tracked service that has the tag
        #[arg(long)]
        all: bool,
    },
    /// Bootstrap networks, keys, config and secrets, then deploy
    SpinUp {
        #[arg(long, conflicts_with_all = ["prod_only", "all"])]
        staging_only: bool,
        #[arg(long, conflicts_with = "all")]
        prod_only: bool,
        #[arg(long)]
        all: bool,
    },
    /// Print the deployment log
    Log {
        /// Only the most recent N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    if let Commands::Version = cli.command {
        let version = version_info();
        println!("{}", serde_json::to_string_pretty(&version)?);
        return Ok(0);
    }

    let options = AppOptions::new(cli.global.state_dir.clone(), cli.global.yes, cli.global.actor.clone());
    let layout = options.layout.clone();
    let settings = Settings::load(&layout.settings_file())
        .await
        .with_context(|| format!("unable to load {}", layout.settings_file().path().display()))?;

    let log_dir = layout.logs_dir();
    let _guard = init_logging(LogOptions {
        log_level: cli.global.log_level.unwrap_or(settings.log_level),
        json_format: cli.global.json_logs,
        log_dir: log_dir.exists().await.then(|| log_dir.path().to_path_buf()),
    })?;

    if let Commands::Log { limit } = cli.command {
        let entries = DeploymentLog::new(layout.deployment_log_file()).entries().await?;
        let skip = limit.map(|n| entries.len().saturating_sub(n)).unwrap_or(0);
        for entry in entries.into_iter().skip(skip) {
            println!("{}", serde_json::to_string(&entry)?);
        }
        return Ok(0);
    }

    let ctx = AppContext::init(options, settings).await?;

    let code = match cli.command {
        Commands::DeployStaging { image_tag } => {
            let report = deploy_staging(&ctx, image_tag.as_deref()).await.map_err(lease_hint)?;
            print_report(&report);
            report.exit_code()
        }
        Commands::Promote => {
            let report = promote(&ctx).await.map_err(lease_hint)?;
            print_report(&report);
            report.exit_code()
        }
        Commands::Rollback { target, all } => match target.as_deref() {
            None | Some("list") => {
                if all {
                    warn!("--all only applies when restoring a tag");
                }
                print_rollbacks(&rollback::list(&ctx).await?);
                0
            }
            Some(tag) => {
                let scope = if all { RollbackScope::All } else { RollbackScope::Primary };
                let report = rollback::restore(&ctx, tag, scope).await.map_err(lease_hint)?;
                print_report(&report);
                report.exit_code()
            }
        },
        Commands::SpinUp {
            staging_only,
            prod_only,
            ..
        } => {
            let mode = if staging_only {
                SpinUpMode::StagingOnly
            } else if prod_only {
                SpinUpMode::ProdOnly
            } else {
                SpinUpMode::All
            };
            let report = spin_up(&ctx, mode).await.map_err(lease_hint)?;
            print_spin_up(&report);
            report.exit_code()
        }
        Commands::Log { .. } | Commands::Version => 0,
    };
    Ok(code)
}

fn lease_hint(err: ReleaseError) -> anyhow::Error {
    match err {
        ReleaseError::LeaseHeld { .. } => {
            anyhow::Error::new(err).context("another release is in progress")
        }
        other => anyhow::Error::new(other),
    }
}

// ================================== OUTPUT ===================================== //

fn print_health(environment: EnvironmentName, report: &HealthReport) {
    println!("{}", format!("{} health", environment).bold());
    for (service, health) in &report.services {
        let health = match health {
            ServiceHealth::Healthy => health.to_string().green(),
            ServiceHealth::Unhealthy => health.to_string().red(),
            ServiceHealth::Unknown => health.to_string().yellow(),
        };
        println!("  {:<12} {}", service, health);
    }
}

fn print_report(report: &RunReport) {
    for (environment, health) in &report.health {
        print_health(*environment, health);
    }
    if !report.tags.is_empty() {
        println!("{}", "tags".bold());
        for (service, outcome) in &report.tags {
            println!("  {:<12} {}", service, outcome);
        }
    }
    for note in &report.notes {
        println!("  {} {}", "!".yellow(), note);
    }
    if let Some(tag) = &report.tag {
        println!("{} {}", "tag:".dimmed(), tag);
    }

    let terminal = report.terminal.to_string();
    let terminal = match report.terminal {
        Terminal::Success => terminal.green().bold(),
        Terminal::Partial | Terminal::Aborted => terminal.yellow().bold(),
        Terminal::Failed(_) | Terminal::NotFound(_) => terminal.red().bold(),
    };
    println!("{} {}", report.action, terminal);
}

fn print_rollbacks(records: &[RollbackRecord]) {
    if records.is_empty() {
        println!("no rollback points");
        return;
    }
    for record in records {
        println!(
            "{}  {}  {}",
            record.tag,
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            record.source_environment
        );
    }
}

fn print_spin_up(report: &SpinUpReport) {
    for resource in &report.resources {
        let outcome = match resource.outcome {
            EnsureOutcome::Created => resource.outcome.to_string().green(),
            EnsureOutcome::AlreadyExists => resource.outcome.to_string().dimmed(),
        };
        println!("  {:<8} {:<32} {}", resource.kind, resource.name, outcome);
    }
    print_report(&report.run);
}
