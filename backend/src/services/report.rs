//! Progress report pipeline: item set, weekly series, table, outputs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;

use super::export::write_outputs;
use super::progress::ProgressOptions;
use super::table::ProgressTable;
use super::weekly_series::{run_weekly_series, SeriesPlan};
use crate::config::AppConfig;
use crate::models::WorkItem;
use crate::tracker::context::RunContext;
use crate::tracker::repository::{RepositoryResult, WorkItemRepository};
use crate::tracker::services::{fetch_items_as_of, IdSelection};

/// What a report run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub items: usize,
    pub checkpoints: usize,
    pub rows: usize,
    pub outputs: Vec<PathBuf>,
}

/// Load the tracked items in their current state.
///
/// Ids come from the configured query; in test-run mode only the first
/// `test_run.max_items` are kept.
pub async fn load_items<R>(
    repo: &R,
    config: &AppConfig,
    test_run: bool,
) -> RepositoryResult<Vec<WorkItem>>
where
    R: WorkItemRepository + ?Sized,
{
    let mut ids = repo
        .query_item_ids(&config.work_item_query(), config.query.top)
        .await?;
    if test_run {
        ids.truncate(config.test_run.max_items);
    }
    info!("Tracking {} work items", ids.len());
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let fields = config.item_fields();
    let snapshots =
        fetch_items_as_of(repo, &IdSelection::List(ids), None, Some(fields.as_slice())).await?;
    Ok(snapshots
        .iter()
        .map(|s| WorkItem::from_snapshot(s, &config.report.fields))
        .collect())
}

/// The weekly series plan described by `config`.
pub fn series_plan(config: &AppConfig, today: NaiveDate, test_run: bool) -> SeriesPlan {
    SeriesPlan {
        project_start: config.report.project_start_date,
        project_end: config.report.project_end_date,
        today,
        max_checkpoints: test_run.then_some(config.test_run.max_checkpoints),
        options: ProgressOptions {
            future_actuals_are_none: config.report.future_actuals_are_none,
            missing_actual: config.report.missing_actual,
            fields: config.report.fields.clone(),
        },
    }
}

/// Compute the assembled progress table for `items`.
pub async fn build_progress_table<R>(
    repo: &R,
    items: &[WorkItem],
    plan: &SeriesPlan,
) -> RepositoryResult<ProgressTable>
where
    R: WorkItemRepository + ?Sized,
{
    let rows = run_weekly_series(repo, items, plan).await?;
    Ok(ProgressTable::assemble(rows))
}

/// Run the full report and write the configured outputs.
///
/// `force_test_run` enables test-run bounds regardless of
/// `report.test_run`.
pub async fn run_report(
    ctx: &RunContext,
    today: NaiveDate,
    force_test_run: bool,
) -> Result<ReportSummary> {
    let config = ctx.config();
    let test_run = force_test_run || config.report.test_run;
    if test_run {
        info!(
            "Test run: at most {} items and {} checkpoints",
            config.test_run.max_items, config.test_run.max_checkpoints
        );
    }

    let items = load_items(ctx.repo(), config, test_run)
        .await
        .context("Failed to load work items")?;
    let plan = series_plan(config, today, test_run);
    let checkpoints = plan.checkpoints().len();

    let table = build_progress_table(ctx.repo(), &items, &plan)
        .await
        .context("Failed to compute weekly progress")?;
    let outputs = write_outputs(
        &table,
        &config.report.output_dir,
        &config.report.output_formats,
    )?;

    Ok(ReportSummary {
        items: items.len(),
        checkpoints,
        rows: table.len(),
        outputs,
    })
}
