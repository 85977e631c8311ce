//! Work item records as consumed by the progress engine.
//!
//! The tracking service hands back open-ended field maps keyed by field
//! reference name. [`WorkItem`] pulls the handful of fields the engine needs
//! into typed slots and keeps everything else in [`WorkItem::extra`].

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::time::parse_service_date;
use crate::define_id_type;

define_id_type!(i64, WorkItemId);

/// One item's field values as returned by a (possibly point-in-time) query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub id: WorkItemId,
    /// Revision number the snapshot was taken from, when the service reports it.
    pub rev: Option<i64>,
    pub fields: Map<String, Value>,
}

impl FieldSnapshot {
    pub fn new(id: WorkItemId, fields: Map<String, Value>) -> Self {
        Self {
            id,
            rev: None,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Read a field as a percentage. Numbers and numeric strings are accepted.
    pub fn get_percent(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(value_as_f64)
    }
}

/// Mapping from the logical fields the engine reads to the reference names
/// used by the tracking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub green_start: String,
    pub green_end: String,
    pub red_start: String,
    pub red_end: String,
    pub deliverable_type: String,
    pub phase: String,
    pub rag_status: String,
    pub state: String,
    pub progress_percent: String,
    pub title: String,
    pub work_item_type: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            green_start: "Custom.GreenStartDate".to_string(),
            green_end: "Custom.GreenEndDate".to_string(),
            red_start: "Custom.RedStartDate".to_string(),
            red_end: "Custom.RedEndDate".to_string(),
            deliverable_type: "Custom.DeliverableType".to_string(),
            phase: "Custom.Phase".to_string(),
            rag_status: "Custom.RAGStatus".to_string(),
            state: "System.State".to_string(),
            progress_percent: "Custom.ProgressPercentageComplete".to_string(),
            title: "System.Title".to_string(),
            work_item_type: "System.WorkItemType".to_string(),
        }
    }
}

impl FieldNames {
    /// Reference names of every typed field, in a stable order.
    pub fn all(&self) -> Vec<&str> {
        vec![
            self.green_start.as_str(),
            self.green_end.as_str(),
            self.red_start.as_str(),
            self.red_end.as_str(),
            self.deliverable_type.as_str(),
            self.phase.as_str(),
            self.rag_status.as_str(),
            self.state.as_str(),
            self.progress_percent.as_str(),
            self.title.as_str(),
            self.work_item_type.as_str(),
        ]
    }
}

/// A tracked deliverable with its plan windows and self-reported progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub rev: Option<i64>,
    pub title: Option<String>,
    pub work_item_type: Option<String>,
    pub green_start: Option<NaiveDate>,
    pub green_end: Option<NaiveDate>,
    pub red_start: Option<NaiveDate>,
    pub red_end: Option<NaiveDate>,
    pub deliverable_type: Option<String>,
    pub phase: Option<String>,
    pub rag_status: Option<String>,
    pub state: Option<String>,
    pub progress_percent: Option<f64>,
    /// Fields the engine never inspects, passed through untouched.
    pub extra: BTreeMap<String, Value>,
}

impl WorkItem {
    /// A bare item with no plan and no progress.
    pub fn new(id: WorkItemId) -> Self {
        Self {
            id,
            rev: None,
            title: None,
            work_item_type: None,
            green_start: None,
            green_end: None,
            red_start: None,
            red_end: None,
            deliverable_type: None,
            phase: None,
            rag_status: None,
            state: None,
            progress_percent: None,
            extra: BTreeMap::new(),
        }
    }

    /// Build a typed record from a field snapshot.
    ///
    /// Unparseable dates and percentages become `None`; the raw value is not
    /// kept in `extra`.
    pub fn from_snapshot(snapshot: &FieldSnapshot, names: &FieldNames) -> Self {
        let date = |field: &str| snapshot.get(field).and_then(value_as_date);
        let text = |field: &str| snapshot.get(field).and_then(value_as_string);

        let known = names.all();
        let extra = snapshot
            .fields
            .iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            id: snapshot.id,
            rev: snapshot.rev,
            title: text(&names.title),
            work_item_type: text(&names.work_item_type),
            green_start: date(&names.green_start),
            green_end: date(&names.green_end),
            red_start: date(&names.red_start),
            red_end: date(&names.red_end),
            deliverable_type: text(&names.deliverable_type),
            phase: text(&names.phase),
            rag_status: text(&names.rag_status),
            state: text(&names.state),
            progress_percent: snapshot.get_percent(&names.progress_percent),
            extra,
        }
    }

    pub fn with_green(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.green_start = Some(start);
        self.green_end = Some(end);
        self
    }

    pub fn with_red(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.red_start = Some(start);
        self.red_end = Some(end);
        self
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn value_as_date(value: &Value) -> Option<NaiveDate> {
    value.as_str().and_then(parse_service_date)
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(fields: Value) -> FieldSnapshot {
        let Value::Object(map) = fields else {
            panic!("fields must be an object");
        };
        FieldSnapshot::new(WorkItemId::new(42), map)
    }

    #[test]
    fn test_from_snapshot_typed_fields() {
        let snap = snapshot(json!({
            "System.Title": "Ship the thing",
            "System.State": "Active",
            "Custom.GreenStartDate": "2024-01-01T00:00:00Z",
            "Custom.GreenEndDate": "2024-03-01T00:00:00Z",
            "Custom.RAGStatus": "Amber",
            "Custom.ProgressPercentageComplete": 40,
        }));
        let item = WorkItem::from_snapshot(&snap, &FieldNames::default());

        assert_eq!(item.id, WorkItemId::new(42));
        assert_eq!(item.title.as_deref(), Some("Ship the thing"));
        assert_eq!(item.state.as_deref(), Some("Active"));
        assert_eq!(item.rag_status.as_deref(), Some("Amber"));
        assert_eq!(item.green_start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(item.green_end, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(item.red_start, None);
        assert_eq!(item.progress_percent, Some(40.0));
        assert!(item.extra.is_empty());
    }

    #[test]
    fn test_from_snapshot_keeps_unknown_fields_in_extra() {
        let snap = snapshot(json!({
            "System.Tags": "programme; wave-2",
            "System.AreaPath": "Org\\Team",
        }));
        let item = WorkItem::from_snapshot(&snap, &FieldNames::default());

        assert_eq!(item.extra.len(), 2);
        assert_eq!(item.extra["System.Tags"], json!("programme; wave-2"));
    }

    #[test]
    fn test_unparseable_values_become_none() {
        let snap = snapshot(json!({
            "Custom.GreenStartDate": "soon",
            "Custom.RedEndDate": null,
            "Custom.ProgressPercentageComplete": "n/a",
        }));
        let item = WorkItem::from_snapshot(&snap, &FieldNames::default());

        assert_eq!(item.green_start, None);
        assert_eq!(item.red_end, None);
        assert_eq!(item.progress_percent, None);
    }

    #[test]
    fn test_percent_accepts_numeric_strings_and_floats() {
        let snap = snapshot(json!({ "a": "75", "b": 12.5, "c": true }));
        assert_eq!(snap.get_percent("a"), Some(75.0));
        assert_eq!(snap.get_percent("b"), Some(12.5));
        assert_eq!(snap.get_percent("c"), None);
        assert_eq!(snap.get_percent("missing"), None);
    }

    #[test]
    fn test_custom_field_names() {
        let names = FieldNames {
            progress_percent: "Acme.Progress".to_string(),
            ..FieldNames::default()
        };
        let snap = snapshot(json!({ "Acme.Progress": 90 }));
        let item = WorkItem::from_snapshot(&snap, &names);
        assert_eq!(item.progress_percent, Some(90.0));
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = WorkItemId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        assert_eq!(id.to_string(), "7");
    }
}
