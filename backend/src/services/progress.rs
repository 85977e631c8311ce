//! Per-checkpoint progress calculation.
//!
//! For one weekly checkpoint this computes, for every tracked item, the green
//! and red forecast percentages from the plan windows and the actual
//! percentage as the item reported it at that point in time.

use std::collections::HashMap;

use chrono::NaiveDate;
use log::{debug, warn};

use crate::models::{
    calc_pct_completion, round_percent, start_of_day_utc, weeks_between, FieldNames, FieldSnapshot,
    MissingActualPolicy, ProgressRow, WorkItem, WorkItemId,
};
use crate::tracker::repository::{RepositoryResult, WorkItemRepository};
use crate::tracker::services::{fetch_items_as_of, IdSelection};

/// Value treated as full completion for carry-forward.
pub const COMPLETE_PERCENT: u8 = 100;

/// Options that shape how actual values are resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressOptions {
    /// Report checkpoints after the current week with an unknown actual.
    pub future_actuals_are_none: bool,
    /// Actual reported for items the service omitted from a fetch.
    pub missing_actual: MissingActualPolicy,
    /// Field reference names; only `progress_percent` is read here.
    pub fields: FieldNames,
}

/// Actual percentages carried from one checkpoint to the next, per item.
///
/// Once an item resolves to 100 it stays at 100 and is no longer queried.
/// Unknown actuals leave the carried value untouched.
#[derive(Debug, Clone, Default)]
pub struct CarryForward {
    actuals: HashMap<WorkItemId, u8>,
}

impl CarryForward {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last resolved actual of `id`, if any.
    pub fn get(&self, id: WorkItemId) -> Option<u8> {
        self.actuals.get(&id).copied()
    }

    pub fn is_complete(&self, id: WorkItemId) -> bool {
        self.get(id) == Some(COMPLETE_PERCENT)
    }

    /// Record this checkpoint's actual. Completion is never undone.
    pub fn record(&mut self, id: WorkItemId, actual: Option<u8>) {
        let Some(value) = actual else {
            return;
        };
        if self.is_complete(id) {
            return;
        }
        self.actuals.insert(id, value);
    }

    pub fn completed_count(&self) -> usize {
        self.actuals
            .values()
            .filter(|v| **v == COMPLETE_PERCENT)
            .count()
    }
}

/// How the actual of one item at one checkpoint is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActualSource {
    Resolved(Option<u8>),
    History,
}

/// Whether `as_of_week` lies after the week currently in progress.
pub fn is_future_checkpoint(current_week: NaiveDate, as_of_week: NaiveDate) -> bool {
    weeks_between(current_week, as_of_week) > 0
}

/// Compute one progress row per item for the checkpoint `as_of_week`.
///
/// Forecasts are evaluated at `as_of_week`. Actuals come from the item state
/// at midnight UTC of `min(as_of_week, current_week)`; every item that needs
/// one is read in a single fetch. Items already complete in `carry` are not
/// fetched, and future checkpoints are not fetched at all when
/// `future_actuals_are_none` is set.
///
/// Rows are returned in the order of `items`.
///
/// # Errors
/// Any repository failure is returned unchanged; a missing progress field
/// is reported as 0 and an omitted item follows `missing_actual`.
pub async fn compute_weekly_progress<R>(
    repo: &R,
    items: &[WorkItem],
    current_week: NaiveDate,
    as_of_week: NaiveDate,
    options: &ProgressOptions,
    carry: &mut CarryForward,
) -> RepositoryResult<Vec<ProgressRow>>
where
    R: WorkItemRepository + ?Sized,
{
    let future = is_future_checkpoint(current_week, as_of_week);

    let sources: Vec<ActualSource> = items
        .iter()
        .map(|item| {
            if future && options.future_actuals_are_none {
                ActualSource::Resolved(None)
            } else if carry.is_complete(item.id) {
                ActualSource::Resolved(Some(COMPLETE_PERCENT))
            } else {
                ActualSource::History
            }
        })
        .collect();

    let lookup: Vec<WorkItemId> = items
        .iter()
        .zip(&sources)
        .filter(|(_, source)| **source == ActualSource::History)
        .map(|(item, _)| item.id)
        .collect();

    let snapshots = if lookup.is_empty() {
        Vec::new()
    } else {
        let history_date = as_of_week.min(current_week);
        let fields = [options.fields.progress_percent.clone()];
        debug!(
            "Checkpoint {}: reading {} of {} items as of {}",
            as_of_week,
            lookup.len(),
            items.len(),
            history_date
        );
        fetch_items_as_of(
            repo,
            &IdSelection::List(lookup),
            Some(start_of_day_utc(history_date)),
            Some(&fields[..]),
        )
        .await?
    };
    let by_id: HashMap<WorkItemId, &FieldSnapshot> =
        snapshots.iter().map(|s| (s.id, s)).collect();

    let mut rows = Vec::with_capacity(items.len());
    for (item, source) in items.iter().zip(sources) {
        let green = calc_pct_completion(item.green_start, item.green_end, as_of_week);
        let red = calc_pct_completion(item.red_start, item.red_end, as_of_week);

        let actual = match source {
            ActualSource::Resolved(value) => value,
            ActualSource::History => match by_id.get(&item.id) {
                Some(snapshot) => {
                    let raw = snapshot
                        .get_percent(&options.fields.progress_percent)
                        .unwrap_or(0.0);
                    Some(round_percent(raw))
                }
                None => {
                    warn!(
                        "Work item {} was not returned as of {}; reporting {:?}",
                        item.id, as_of_week, options.missing_actual
                    );
                    match options.missing_actual {
                        MissingActualPolicy::Zero => Some(0),
                        MissingActualPolicy::Unknown => None,
                    }
                }
            },
        };

        carry.record(item.id, actual);
        rows.push(ProgressRow {
            item_id: item.id,
            report_date: as_of_week,
            green_forecast_percent: round_percent(green),
            red_forecast_percent: round_percent(red),
            actual_percent: actual,
        });
    }

    Ok(rows)
}
