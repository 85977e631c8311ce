//! Week-series driver: runs the progress calculator over every weekly
//! checkpoint of the project window.

use chrono::{Days, NaiveDate};
use log::{debug, info};

use super::progress::{compute_weekly_progress, CarryForward, ProgressOptions};
use crate::models::{week_start, ProgressRow, WorkItem};
use crate::tracker::repository::{RepositoryResult, WorkItemRepository};

/// Mondays from the week containing `start` through `end`, inclusive.
///
/// Empty when `end` precedes `start`.
pub fn generate_checkpoints(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }

    let mut checkpoints = Vec::new();
    let mut week = week_start(start);
    while week <= end {
        checkpoints.push(week);
        match week.checked_add_days(Days::new(7)) {
            Some(next) => week = next,
            None => break,
        }
    }
    checkpoints
}

/// Inputs of one run of the weekly series.
#[derive(Debug, Clone)]
pub struct SeriesPlan {
    pub project_start: NaiveDate,
    pub project_end: NaiveDate,
    /// Reference date for past/future classification, normally today.
    pub today: NaiveDate,
    /// Stop after this many checkpoints (test runs).
    pub max_checkpoints: Option<usize>,
    pub options: ProgressOptions,
}

impl SeriesPlan {
    /// Monday of the week in progress, capped at the project end.
    pub fn current_week(&self) -> NaiveDate {
        week_start(self.today.min(self.project_end))
    }

    /// The checkpoints this plan visits, in order.
    pub fn checkpoints(&self) -> Vec<NaiveDate> {
        let mut checkpoints = generate_checkpoints(self.project_start, self.project_end);
        if let Some(max) = self.max_checkpoints {
            checkpoints.truncate(max);
        }
        checkpoints
    }
}

/// Compute progress rows for every item at every checkpoint of `plan`.
///
/// Checkpoints are processed one after another in chronological order and
/// share a single [`CarryForward`]. The first repository error aborts the run.
pub async fn run_weekly_series<R>(
    repo: &R,
    items: &[WorkItem],
    plan: &SeriesPlan,
) -> RepositoryResult<Vec<ProgressRow>>
where
    R: WorkItemRepository + ?Sized,
{
    let checkpoints = plan.checkpoints();
    let current_week = plan.current_week();
    info!(
        "Computing progress for {} items over {} checkpoints ({} to {}, current week {})",
        items.len(),
        checkpoints.len(),
        plan.project_start,
        plan.project_end,
        current_week
    );

    let mut carry = CarryForward::new();
    let mut rows = Vec::with_capacity(items.len() * checkpoints.len());
    for (index, as_of_week) in checkpoints.iter().copied().enumerate() {
        let weekly = compute_weekly_progress(
            repo,
            items,
            current_week,
            as_of_week,
            &plan.options,
            &mut carry,
        )
        .await?;
        debug!(
            "Checkpoint {}/{} ({}): {} rows, {} items complete",
            index + 1,
            checkpoints.len(),
            as_of_week,
            weekly.len(),
            carry.completed_count()
        );
        rows.extend(weekly);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Weekday};
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_checkpoints_start_at_week_of_start() {
        // 2024-01-03 is a Wednesday
        let weeks = generate_checkpoints(d(2024, 1, 3), d(2024, 1, 22));
        assert_eq!(
            weeks,
            vec![d(2024, 1, 1), d(2024, 1, 8), d(2024, 1, 15), d(2024, 1, 22)]
        );
    }

    #[test]
    fn test_checkpoints_end_inclusive_only_on_monday() {
        assert_eq!(generate_checkpoints(d(2024, 1, 1), d(2024, 1, 21)).len(), 3);
        assert_eq!(generate_checkpoints(d(2024, 1, 1), d(2024, 1, 22)).len(), 4);
    }

    #[test]
    fn test_inverted_window_has_no_checkpoints() {
        let weeks = generate_checkpoints(d(2024, 2, 1), d(2024, 1, 1));
        assert!(weeks.is_empty());
    }

    #[test]
    fn test_plan_current_week_is_capped_at_end() {
        let plan = SeriesPlan {
            project_start: d(2024, 1, 1),
            project_end: d(2024, 3, 1),
            today: d(2025, 6, 18),
            max_checkpoints: Some(2),
            options: ProgressOptions::default(),
        };
        assert_eq!(plan.current_week(), d(2024, 2, 26));
        assert_eq!(plan.checkpoints(), vec![d(2024, 1, 1), d(2024, 1, 8)]);
    }

    proptest! {
        #[test]
        fn prop_checkpoints_are_consecutive_mondays(
            start_offset in 0i64..3000,
            span in 0i64..400,
        ) {
            let start = d(2018, 1, 1) + chrono::Duration::days(start_offset);
            let end = start + chrono::Duration::days(span);
            let weeks = generate_checkpoints(start, end);

            prop_assert!(!weeks.is_empty());
            prop_assert_eq!(weeks[0], week_start(start));
            prop_assert!(weeks.iter().all(|w| w.weekday() == Weekday::Mon));
            prop_assert!(weeks.iter().all(|w| *w <= end));
            prop_assert!(weeks.windows(2).all(|p| (p[1] - p[0]).num_days() == 7));
            let last = *weeks.last().unwrap();
            prop_assert!(last + chrono::Duration::days(7) > end);
        }
    }
}
