//! Progress report command line driver.
//!
//! # Usage
//!
//! ```bash
//! # Weekly forecast/actual report (default command)
//! AZURE_DEVOPS_PAT=... progress-report --config progress.toml report
//!
//! # Bounded run: first item, first two checkpoints
//! progress-report report --test-run
//!
//! # Sanitised extract of the 30 most recently changed items
//! progress-report extract --top 30
//!
//! # One field of one item as it stood on a date
//! progress-report field 1234 Custom.ProgressPercentageComplete --as-of 2024-01-15
//! ```
//!
//! # Environment Variables
//!
//! - `AZURE_DEVOPS_PAT`: Personal access token, overrides `azure.pat`
//! - `RUST_LOG`: Log level when `--debug` is not given (default: info)

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wi_progress::config::AppConfig;
use wi_progress::models::{start_of_day_utc, WorkItemId};
use wi_progress::services::extract::{
    extract_work_items, write_extract, DEFAULT_EXTRACT_TOP, EXTRACT_FILE_NAME,
};
use wi_progress::services::report::run_report;
use wi_progress::tracker::services::{
    find_any_build_definition, find_any_project, find_any_repo, work_item_field_as_of,
};
use wi_progress::tracker::{CatalogRepository, RepositoryFactory, RunContext};

#[derive(Parser)]
#[command(name = "progress-report")]
#[command(about = "Weekly forecast/actual progress reconstruction for tracked work items")]
#[command(version)]
struct Cli {
    /// Configuration file (default: progress.toml in ., backend/ or ..)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the weekly progress table and write it (default)
    Report {
        /// Limit the run to the test-run item and checkpoint bounds
        #[arg(long)]
        test_run: bool,
    },

    /// Write a sanitised JSON extract of the most recently changed items
    Extract {
        /// Number of items to extract
        #[arg(long, default_value_t = DEFAULT_EXTRACT_TOP)]
        top: usize,

        /// Output file (default: <output_dir>/WorkItemExtract.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print one field of a work item as it stood at a point in time
    Field {
        /// Work item id
        id: i64,

        /// Field reference name, e.g. System.State
        field: String,

        /// Read the value at midnight UTC of this date (default: now)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// List the projects visible to the token
    Projects,

    /// Show the default project, repository and build definition
    Lookups,
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if debug {
        Level::DEBUG
    } else {
        std::env::var("RUST_LOG")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Level::INFO)
    };

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(true)
                .init();
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_default_location()?,
    };
    Ok(config)
}

async fn run_extract(ctx: &RunContext, top: usize, output: Option<PathBuf>) -> Result<()> {
    let items = extract_work_items(ctx.repo(), &ctx.config().work_item_query(), top)
        .await
        .context("Failed to extract work items")?;
    let path = output.unwrap_or_else(|| ctx.config().report.output_dir.join(EXTRACT_FILE_NAME));
    write_extract(&items, &path)?;
    println!("{} work items written to {}", items.len(), path.display());
    Ok(())
}

async fn show_field(
    ctx: &RunContext,
    id: i64,
    field: &str,
    as_of: Option<NaiveDate>,
) -> Result<()> {
    let as_of = as_of.map(start_of_day_utc).unwrap_or_else(Utc::now);
    let value = work_item_field_as_of(ctx.repo(), WorkItemId::new(id), field, as_of)
        .await
        .with_context(|| format!("Failed to read {} of work item {}", field, id))?;
    match value {
        Some(value) => println!("{}", value),
        None => println!("(unset)"),
    }
    Ok(())
}

async fn list_projects(ctx: &RunContext) -> Result<()> {
    let projects = ctx
        .repo()
        .list_projects()
        .await
        .context("Failed to list projects")?;
    for (index, project) in projects.iter().enumerate() {
        println!("[{}] {}", index, project.name);
    }
    Ok(())
}

async fn show_lookups(ctx: &RunContext) -> Result<()> {
    let project = find_any_project(ctx).await?;
    println!("project:          {} ({})", project.name, project.id);
    let repo = find_any_repo(ctx).await?;
    println!("repository:       {} ({})", repo.name, repo.id);
    let definition = find_any_build_definition(ctx).await?;
    println!("build definition: {} ({})", definition.name, definition.id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_file.as_deref())?;

    let config = load_config(cli.config.as_deref())?;
    let repo = RepositoryFactory::create(&config)?;
    let ctx = RunContext::new(config, repo);

    match cli.command.unwrap_or(Commands::Report { test_run: false }) {
        Commands::Report { test_run } => {
            let today = Utc::now().date_naive();
            let summary = run_report(&ctx, today, test_run).await?;
            info!(
                "Report complete: {} items, {} checkpoints, {} rows",
                summary.items, summary.checkpoints, summary.rows
            );
            for path in &summary.outputs {
                println!("{}", path.display());
            }
        }
        Commands::Extract { top, output } => run_extract(&ctx, top, output).await?,
        Commands::Field { id, field, as_of } => show_field(&ctx, id, &field, as_of).await?,
        Commands::Projects => list_projects(&ctx).await?,
        Commands::Lookups => show_lookups(&ctx).await?,
    }

    Ok(())
}
