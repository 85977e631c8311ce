//! Output records of the weekly progress series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::work_item::WorkItemId;

/// Column names of the assembled progress relation, in output order.
pub const PROGRESS_COLUMNS: [&str; 5] = [
    "id",
    "report_date",
    "green_forecast_percent",
    "red_forecast_percent",
    "actual_percent",
];

/// Forecast and actual completion of one work item at one weekly checkpoint.
///
/// `actual_percent` is `None` when the actual value is unknown, which is
/// distinct from a reported `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRow {
    #[serde(rename = "id")]
    pub item_id: WorkItemId,
    #[serde(with = "report_date_format")]
    pub report_date: NaiveDate,
    pub green_forecast_percent: u8,
    pub red_forecast_percent: u8,
    pub actual_percent: Option<u8>,
}

impl ProgressRow {
    /// Sort key of the assembled table.
    pub fn key(&self) -> (WorkItemId, NaiveDate) {
        (self.item_id, self.report_date)
    }
}

/// How to report the actual value of an item the service omitted from a
/// point-in-time fetch (deleted, not yet created, or not visible).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingActualPolicy {
    /// Report 0, the same as a missing progress field.
    #[default]
    Zero,
    /// Report the actual as unknown.
    Unknown,
}

/// Round a percentage to the nearest integer (halves away from zero) and
/// clamp it into `0..=100`.
pub fn round_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

mod report_date_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_percent() {
        assert_eq!(round_percent(24.4), 24);
        assert_eq!(round_percent(24.5), 25);
        assert_eq!(round_percent(-3.0), 0);
        assert_eq!(round_percent(140.0), 100);
        assert_eq!(round_percent(f64::NAN), 0);
    }

    #[test]
    fn test_row_serializes_with_output_schema() {
        let row = ProgressRow {
            item_id: WorkItemId::new(3),
            report_date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            green_forecast_percent: 13,
            red_forecast_percent: 0,
            actual_percent: None,
        };
        let json = serde_json::to_value(row).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 3,
                "report_date": "2024-01-08",
                "green_forecast_percent": 13,
                "red_forecast_percent": 0,
                "actual_percent": null,
            })
        );
    }
}
