//! Work item repository trait: id queries and point-in-time field fetches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::RepositoryResult;
use crate::models::{FieldSnapshot, WorkItemId};

/// Filter used to build the item set of a run.
///
/// Results are always ordered by last change, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkItemQuery {
    /// Restrict to these work item types; empty means any type.
    pub work_item_types: Vec<String>,
    /// Restrict to this area path and everything under it.
    pub area_path: Option<String>,
}

impl WorkItemQuery {
    /// Render the filter as a WIQL statement.
    pub fn to_wiql(&self) -> String {
        let mut clauses = Vec::new();
        if !self.work_item_types.is_empty() {
            let types = self
                .work_item_types
                .iter()
                .map(|t| wiql_literal(t))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("[System.WorkItemType] IN ({})", types));
        }
        if let Some(ref area) = self.area_path {
            clauses.push(format!("[System.AreaPath] UNDER {}", wiql_literal(area)));
        }

        let mut wiql = String::from(
            "SELECT [System.Id], [System.WorkItemType], [System.Title], [System.State], \
             [System.AreaPath], [System.IterationPath], [System.Tags] FROM WorkItems",
        );
        if !clauses.is_empty() {
            wiql.push_str(" WHERE ");
            wiql.push_str(&clauses.join(" AND "));
        }
        wiql.push_str(" ORDER BY [System.ChangedDate] DESC");
        wiql
    }

    /// Evaluate the filter against a field map, for backends without WIQL.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        if !self.work_item_types.is_empty() {
            let item_type = fields.get("System.WorkItemType").and_then(Value::as_str);
            match item_type {
                Some(t) if self.work_item_types.iter().any(|w| w.eq_ignore_ascii_case(t)) => {}
                _ => return false,
            }
        }
        if let Some(ref area) = self.area_path {
            let item_area = fields.get("System.AreaPath").and_then(Value::as_str);
            match item_area {
                Some(a) if area_is_under(a, area) => {}
                _ => return false,
            }
        }
        true
    }
}

fn wiql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn area_is_under(item_area: &str, root: &str) -> bool {
    let item = item_area.to_ascii_lowercase();
    let root = root.to_ascii_lowercase();
    item == root || item.starts_with(&format!("{}\\", root))
}

/// Repository trait for work item queries against the tracking service.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    /// Check if the service is reachable with the configured credentials.
    ///
    /// # Returns
    /// - `Ok(true)` if the service is healthy
    /// - `Ok(false)` if it is reachable but unhealthy
    /// - `Err(RepositoryError)` if the check itself failed
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Ids of the work items matching `query`, most recently changed first.
    ///
    /// # Arguments
    /// * `query` - Filter on type and area path
    /// * `top` - Maximum number of ids to return
    async fn query_item_ids(
        &self,
        query: &WorkItemQuery,
        top: Option<usize>,
    ) -> RepositoryResult<Vec<WorkItemId>>;

    /// Field values of `ids` as they existed at `as_of`.
    ///
    /// Ids the service cannot resolve (deleted, not yet created at `as_of`,
    /// no permission) are left out of the result instead of failing the call.
    /// Results follow the order of `ids`.
    ///
    /// # Arguments
    /// * `ids` - Work items to fetch
    /// * `as_of` - Point in time; `None` means the current state
    /// * `fields` - Field reference names to return; empty means all fields
    async fn fetch_items_as_of(
        &self,
        ids: &[WorkItemId],
        as_of: Option<DateTime<Utc>>,
        fields: &[String],
    ) -> RepositoryResult<Vec<FieldSnapshot>>;
}
