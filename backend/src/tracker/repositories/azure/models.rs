//! Wire types of the Azure DevOps REST API.
//!
//! Only the fields the repository reads are modelled; everything else in the
//! payloads is ignored by serde.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{BuildDefinitionRef, FieldSnapshot, GitRepositoryRef, ProjectRef, WorkItemId};

/// Envelope used by every list endpoint.
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct TeamProjectReference {
    pub id: String,
    pub name: String,
}

impl From<TeamProjectReference> for ProjectRef {
    fn from(p: TeamProjectReference) -> Self {
        ProjectRef {
            id: p.id,
            name: p.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GitRepository {
    pub id: String,
    pub name: String,
}

impl From<GitRepository> for GitRepositoryRef {
    fn from(r: GitRepository) -> Self {
        GitRepositoryRef {
            id: r.id,
            name: r.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BuildDefinitionReference {
    pub id: i64,
    pub name: String,
}

impl From<BuildDefinitionReference> for BuildDefinitionRef {
    fn from(d: BuildDefinitionReference) -> Self {
        BuildDefinitionRef {
            id: d.id,
            name: d.name,
        }
    }
}

/// Body of a WIQL query request.
#[derive(Debug, serde::Serialize)]
pub struct Wiql<'a> {
    pub query: &'a str,
}

/// WIQL results only carry references; fields are fetched separately.
#[derive(Debug, Deserialize)]
pub struct WorkItemQueryResult {
    #[serde(rename = "workItems", default)]
    pub work_items: Vec<WorkItemReference>,
}

#[derive(Debug, Deserialize)]
pub struct WorkItemReference {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct WorkItem {
    pub id: i64,
    #[serde(default)]
    pub rev: Option<i64>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl From<WorkItem> for FieldSnapshot {
    fn from(w: WorkItem) -> Self {
        FieldSnapshot {
            id: WorkItemId::new(w.id),
            rev: w.rev,
            fields: w.fields,
        }
    }
}

/// Batch fetch result. With `errorPolicy=omit` unresolvable ids come back as
/// `null` entries.
pub type WorkItemBatch = ListResponse<Option<WorkItem>>;

/// Error payload returned alongside non-success statuses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(rename = "typeKey", default)]
    pub type_key: Option<String>,
}
