//! Service layer for the progress report.
//!
//! - [`progress`]: per-checkpoint forecast and actual calculation
//! - [`weekly_series`]: checkpoint generation and the series driver
//! - [`table`]: sorting, de-duplication and `DataFrame` conversion
//! - [`export`]: CSV and JSON writers
//! - [`extract`]: sanitised work item extract
//! - [`report`]: the end-to-end report pipeline

pub mod export;
pub mod extract;
pub mod progress;
pub mod report;
pub mod table;
pub mod weekly_series;


pub use export::{write_csv, write_json, write_outputs};
pub use extract::{extract_work_items, sanitize_json, write_extract};
pub use progress::{compute_weekly_progress, CarryForward, ProgressOptions};
pub use report::{run_report, ReportSummary};
pub use table::ProgressTable;
pub use weekly_series::{generate_checkpoints, run_weekly_series, SeriesPlan};
