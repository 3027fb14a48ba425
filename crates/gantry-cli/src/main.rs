//! Gantry - LAMISplus module installer
//!
//! Usage:
//!   gantry install --all      # Install every module in the dependency table
//!   gantry install hiv ndr    # Install the named modules only
//!   gantry retry              # Re-drive whatever the server is missing
//!   gantry status             # Reconcile against the server and show the grid

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use gantry_core::client::{HttpModuleService, authenticate};
use gantry_core::config::{CONFIG_FILE_NAME, GantryConfig};
use gantry_core::discovery::scan_modules_dir;
use gantry_core::orchestrator::{InstallOrchestrator, OrchestratorOptions, PassSummary};
use gantry_core::tracker::{ModuleRecord, ModuleStatus, StatusTracker};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "LAMISplus module installer", long_about = None)]
struct Cli {
    /// Path to a gantry.toml profile
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Module server base URL (overrides the profile)
    #[arg(long, global = true)]
    server: Option<Url>,

    /// Login name (overrides the profile)
    #[arg(long, global = true)]
    username: Option<String>,

    /// Folder scanned for module archives (overrides the profile)
    #[arg(long, global = true)]
    modules_dir: Option<PathBuf>,

    /// Trust install replies without polling the installed list
    #[arg(long, global = true)]
    no_confirm: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload and install modules on the server
    Install {
        /// Install every module in the dependency table, in declaration order
        #[arg(short, long, conflicts_with = "keys")]
        all: bool,

        /// Module names to install, dependency checks waived
        #[arg(required_unless_present = "all")]
        keys: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Re-attempt every module the server does not report as installed
    Retry {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show per-module status against the server
    Status {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only report failures (non-zero exit if any)
    Quiet,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    // Profile: explicit file, discovered file, or flags alone
    let mut config = match GantryConfig::find(cli.config.as_deref())? {
        Some(config) => config,
        None => {
            let Some(server) = cli.server.clone() else {
                anyhow::bail!("no {CONFIG_FILE_NAME} found; pass --config <path> or --server <url>");
            };
            GantryConfig::new(server)
        }
    };
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(username) = cli.username {
        config.username = Some(username);
    }
    if let Some(dir) = cli.modules_dir {
        config.modules_dir = dir;
    }
    if cli.no_confirm {
        config.confirm_install = false;
    }

    let graph = config.graph()?;
    let records = scan_modules_dir(&config.modules_dir)?;

    // Credentials not in the profile are prompted for
    let username = match config.username.clone() {
        Some(name) => name,
        None => Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Username")
            .interact_text()?,
    };
    let password = match config.password.clone() {
        Some(secret) => secret,
        None => Password::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Password for {username}"))
            .interact()?,
    };

    tracing::info!("Authenticating as {} against {}", username, config.server_url);
    let token = authenticate(&config.server_url, &username, &password).await?;
    let service = HttpModuleService::new(config.server_url.clone(), token)?;

    let options = OrchestratorOptions {
        confirm_install: config.confirm_install,
        confirm_timeout: config.confirm_timeout(),
        poll_interval: config.poll_interval(),
    };
    let cancel = CancellationToken::new();
    let mut orchestrator =
        InstallOrchestrator::new(Arc::new(service), graph, StatusTracker::new(records))
            .with_options(options)
            .with_cancellation(cancel.clone());

    tokio::spawn(watch_ctrl_c(cancel));

    let (summary, format) = match cli.command {
        Commands::Install { all, keys, format } => {
            let summary = if all {
                orchestrator.install_all().await
            } else {
                orchestrator.install_selected(&keys).await
            };
            (Some(summary), format)
        }
        Commands::Retry { format } => (retry_missing(&mut orchestrator).await, format),
        Commands::Status { format } => {
            orchestrator.reconcile().await;
            (None, format)
        }
    };

    match format {
        OutputFormat::Table => print_table(orchestrator.tracker(), summary.as_ref()),
        OutputFormat::Json => print_json(orchestrator.tracker(), summary.as_ref())?,
        OutputFormat::Quiet => {
            if let Some(summary) = &summary {
                if summary.failed > 0 {
                    println!("{} modules failed", summary.failed);
                }
            }
        }
    }

    if summary.is_some_and(|summary| summary.has_failures()) {
        std::process::exit(1);
    }
    Ok(())
}

/// Cancel the pass on Ctrl+C; takes effect between modules.
async fn watch_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Interrupt received, stopping after the current module");
        cancel.cancel();
    }
}

/// Tracker state does not persist across runs, so replay judges against the
/// server instead: reconcile first, then re-drive whatever it lacks.
async fn retry_missing(orchestrator: &mut InstallOrchestrator) -> Option<PassSummary> {
    orchestrator.reconcile().await;
    let missing: Vec<String> = orchestrator
        .tracker()
        .records()
        .iter()
        .filter(|record| record.status != ModuleStatus::Installed)
        .map(|record| record.name.clone())
        .collect();
    if missing.is_empty() {
        println!("Nothing to retry; the server reports every module installed.");
        return None;
    }
    Some(orchestrator.install_selected(&missing).await)
}

fn print_table(tracker: &StatusTracker, summary: Option<&PassSummary>) {
    let records = tracker.records();
    if records.is_empty() {
        println!("No module archives found.");
        println!("Point --modules-dir at a folder of .jar files to get started.");
        return;
    }

    println!("  {:<22} {:<14} {:<16} Status", "Module", "Local", "Installed");
    println!("  {}", "-".repeat(70));

    for record in records {
        println!(
            "  {:<22} {:<14} {:<16} {}",
            truncate(&record.name, 22),
            truncate(&record.local_version, 14),
            truncate(&record.installed_version, 16),
            status_cell(record),
        );
    }
    println!();

    if !tracker.log_lines().is_empty() {
        println!("Activity:");
        for line in tracker.log_lines() {
            println!("  {line}");
        }
        println!();
    }

    if let Some(summary) = summary {
        let percent = tracker.progress().percent;
        println!(
            "Summary: {} installed, {} failed, {} skipped, {} without artifacts ({percent}%)",
            summary.installed, summary.failed, summary.skipped, summary.missing
        );
    }
}

fn print_json(tracker: &StatusTracker, summary: Option<&PassSummary>) -> Result<()> {
    let output = serde_json::json!({
        "modules": tracker.records(),
        "progress": tracker.progress(),
        "summary": summary,
        "log": tracker.log_lines(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn status_cell(record: &ModuleRecord) -> String {
    let status = match record.status {
        ModuleStatus::Pending => style("Pending").dim(),
        ModuleStatus::Installing => style("Installing").cyan(),
        ModuleStatus::Installed => style("Installed").green(),
        ModuleStatus::Failed => style("Failed").red(),
        ModuleStatus::Skipped => style("Skipped").yellow(),
    };
    match &record.failure {
        Some(reason) => format!("{} ({})", status, truncate(reason, 40)),
        None => status.to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        // Failure reasons quote raw server bytes; never cut inside a char.
        let mut cut = max_len - 3;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &s[..cut])
    }
}
