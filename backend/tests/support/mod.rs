#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Map, Value};

use wi_progress::config::AppConfig;
use wi_progress::models::WorkItemId;
use wi_progress::tracker::repositories::LocalRepository;

pub const PROGRESS_FIELD: &str = "Custom.ProgressPercentageComplete";

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the variables on unwind and serializes access to process-global
/// env vars so parallel tests do not observe each other's changes.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Mid-morning UTC on `day`, so a change is visible from the next midnight.
pub fn during(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(10, 0, 0).unwrap())
}

fn service_date(day: NaiveDate) -> Value {
    json!(format!("{}T00:00:00Z", day.format("%Y-%m-%d")))
}

/// Plan windows of a seeded deliverable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plan {
    pub green: Option<(NaiveDate, NaiveDate)>,
    pub red: Option<(NaiveDate, NaiveDate)>,
}

impl Plan {
    pub fn green(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            green: Some((start, end)),
            red: None,
        }
    }

    pub fn with_red(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.red = Some((start, end));
        self
    }
}

/// Create a deliverable whose first revision is at `created`.
pub fn seed_deliverable(repo: &LocalRepository, id: i64, created: DateTime<Utc>, plan: Plan) {
    let mut fields = Map::new();
    fields.insert("System.Id".to_string(), json!(id));
    fields.insert("System.Title".to_string(), json!(format!("Deliverable {}", id)));
    fields.insert("System.WorkItemType".to_string(), json!("Deliverable"));
    fields.insert("System.State".to_string(), json!("Active"));
    if let Some((start, end)) = plan.green {
        fields.insert("Custom.GreenStartDate".to_string(), service_date(start));
        fields.insert("Custom.GreenEndDate".to_string(), service_date(end));
    }
    if let Some((start, end)) = plan.red {
        fields.insert("Custom.RedStartDate".to_string(), service_date(start));
        fields.insert("Custom.RedEndDate".to_string(), service_date(end));
    }
    repo.add_revision(WorkItemId::new(id), created, fields);
}

/// Record a progress update made during `day`.
pub fn report_progress(repo: &LocalRepository, id: i64, day: NaiveDate, percent: f64) {
    repo.set_field_at(
        WorkItemId::new(id),
        during(day),
        PROGRESS_FIELD,
        json!(percent),
    );
}

/// A local-repository configuration for `start..=end` writing into `out`.
///
/// `extra_report` is appended to the `[report]` table.
pub fn local_config(start: NaiveDate, end: NaiveDate, out: &Path, extra_report: &str) -> AppConfig {
    let toml = format!(
        r#"
[repository]
type = "local"

[report]
project_start_date = "{}"
project_end_date = "{}"
output_dir = "{}"
{}

[query]
work_item_types = ["Deliverable"]
"#,
        start,
        end,
        out.display(),
        extra_report
    );
    AppConfig::from_toml_str(&toml).unwrap()
}
