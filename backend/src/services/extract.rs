//! Work item extract: the current state of the most recently changed items,
//! written as sanitised JSON.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::FieldSnapshot;
use crate::tracker::repository::{RepositoryResult, WorkItemQuery, WorkItemRepository};
use crate::tracker::services::{fetch_items_as_of, IdSelection};

/// File name of the extract inside the output directory.
pub const EXTRACT_FILE_NAME: &str = "WorkItemExtract.json";

/// Number of items extracted when no limit is given.
pub const DEFAULT_EXTRACT_TOP: usize = 30;

fn is_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{1f}' | '\u{7f}'..='\u{9f}')
}

/// Clean a JSON document for downstream loaders.
///
/// Object keys lose their dots (`System.Title` becomes `SystemTitle`) and
/// control characters in string values are replaced by spaces. Applied
/// recursively through objects and arrays.
pub fn sanitize_json(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.replace('.', ""), sanitize_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_json).collect()),
        Value::String(s) => Value::String(
            s.chars()
                .map(|c| if is_control(c) { ' ' } else { c })
                .collect(),
        ),
        other => other,
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn snapshot_to_json(snapshot: FieldSnapshot) -> Value {
    let mut object = Map::new();
    object.insert("id".to_string(), Value::from(snapshot.id.value()));
    if let Some(rev) = snapshot.rev {
        object.insert("rev".to_string(), Value::from(rev));
    }
    object.insert("fields".to_string(), Value::Object(snapshot.fields));
    Value::Object(object)
}

/// Query up to `top` items matching `query` and return their current state
/// as sanitised JSON objects (`id`, `rev`, `fields`), in query order.
pub async fn extract_work_items<R>(
    repo: &R,
    query: &WorkItemQuery,
    top: usize,
) -> RepositoryResult<Vec<Value>>
where
    R: WorkItemRepository + ?Sized,
{
    let ids = repo.query_item_ids(query, Some(top)).await?;
    info!("Extracting {} work items", ids.len());
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let every_field: &[String] = &[];
    let snapshots =
        fetch_items_as_of(repo, &IdSelection::List(ids), None, Some(every_field)).await?;
    debug!("Sanitizing {} work items", snapshots.len());
    Ok(snapshots
        .into_iter()
        .map(|s| sanitize_json(snapshot_to_json(s)))
        .collect())
}

/// Write `items` as an indented JSON array with sorted object keys.
pub fn write_extract(items: &[Value], path: &Path) -> Result<()> {
    debug!("Writing json file {}", path.display());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let sorted: Vec<Value> = items.iter().cloned().map(sort_keys).collect();

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    sorted
        .serialize(&mut serializer)
        .context("Failed to serialise work item extract")?;

    let mut file =
        fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(&buffer)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} work items to {}", items.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkItemId;
    use crate::tracker::repositories::LocalRepository;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_sanitize_strips_key_dots_and_control_chars() {
        let dirty = json!({
            "System.Title": "Line one\nLine\ttwo\u{7f}",
            "fields": {
                "Custom.Notes": ["a\u{0}b", {"Nested.Key": "x\u{85}y"}],
                "Custom.Count": 3
            }
        });

        let clean = sanitize_json(dirty);

        assert_eq!(
            clean,
            json!({
                "SystemTitle": "Line one Line two ",
                "fields": {
                    "CustomNotes": ["a b", {"NestedKey": "x y"}],
                    "CustomCount": 3
                }
            })
        );
    }

    #[test]
    fn test_sanitize_keeps_value_dots() {
        let clean = sanitize_json(json!({"url": "https://dev.azure.com/org"}));
        assert_eq!(clean["url"], "https://dev.azure.com/org");
    }

    #[tokio::test]
    async fn test_extract_reads_current_state_in_query_order() {
        let repo = LocalRepository::new();
        for (id, day) in [(1, 3), (2, 5), (3, 4)] {
            let at = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
            repo.add_revision(
                WorkItemId::new(id),
                at,
                json!({
                    "System.Title": format!("Item {}", id),
                    "System.WorkItemType": "Deliverable"
                })
                .as_object()
                .cloned()
                .unwrap(),
            );
        }

        let items = extract_work_items(&repo, &WorkItemQuery::default(), 2)
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], 2);
        assert_eq!(items[0]["fields"]["SystemTitle"], "Item 2");
        assert_eq!(items[1]["id"], 3);
        let log = repo.fetch_log();
        assert!(log[0].as_of.is_some());
        assert!(log[0].fields.is_empty());
    }

    #[test]
    fn test_write_extract_is_indented_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(EXTRACT_FILE_NAME);
        let items = vec![json!({"rev": 2, "id": 1, "fields": {"b": 1, "a": 2}})];

        write_extract(&items, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[\n    {\n        \"fields\""));
        let fields_a = content.find("\"a\"").unwrap();
        let fields_b = content.find("\"b\"").unwrap();
        assert!(fields_a < fields_b);
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, Value::Array(items));
    }
}
