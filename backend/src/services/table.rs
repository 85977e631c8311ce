//! Assembly of progress rows into the output relation.

use log::warn;
use polars::prelude::*;

use crate::models::{ProgressRow, PROGRESS_COLUMNS};

/// Progress rows sorted by `(id, report_date)` with unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressTable {
    rows: Vec<ProgressRow>,
}

impl ProgressTable {
    /// Sort `rows` by `(id, report_date)` and drop repeated keys.
    ///
    /// The sort is stable, so of several rows with the same key the one
    /// produced first is kept.
    pub fn assemble(rows: impl IntoIterator<Item = ProgressRow>) -> Self {
        let mut rows: Vec<ProgressRow> = rows.into_iter().collect();
        rows.sort_by_key(ProgressRow::key);

        let before = rows.len();
        rows.dedup_by_key(|row| row.key());
        let dropped = before - rows.len();
        if dropped > 0 {
            warn!("Dropped {} duplicate (id, report_date) rows", dropped);
        }

        Self { rows }
    }

    pub fn rows(&self) -> &[ProgressRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert to a polars `DataFrame` with the output column names.
    ///
    /// `report_date` is rendered as `YYYY-MM-DD`; `actual_percent` is a
    /// nullable integer column.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let ids: Vec<i64> = self.rows.iter().map(|r| r.item_id.value()).collect();
        let dates: Vec<String> = self
            .rows
            .iter()
            .map(|r| r.report_date.format("%Y-%m-%d").to_string())
            .collect();
        let green: Vec<i64> = self
            .rows
            .iter()
            .map(|r| i64::from(r.green_forecast_percent))
            .collect();
        let red: Vec<i64> = self
            .rows
            .iter()
            .map(|r| i64::from(r.red_forecast_percent))
            .collect();
        let actual: Vec<Option<i64>> = self
            .rows
            .iter()
            .map(|r| r.actual_percent.map(i64::from))
            .collect();

        let [id_col, date_col, green_col, red_col, actual_col] = PROGRESS_COLUMNS;
        df!(
            id_col => ids,
            date_col => dates,
            green_col => green,
            red_col => red,
            actual_col => actual
        )
    }
}

impl IntoIterator for ProgressTable {
    type Item = ProgressRow;
    type IntoIter = std::vec::IntoIter<ProgressRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
