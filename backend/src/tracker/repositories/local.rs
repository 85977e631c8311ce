//! In-memory local repository implementation.
//!
//! This module provides a local implementation of the tracking-service traits
//! suitable for unit testing and offline development. Every work item keeps its
//! full revision history so that point-in-time queries behave like the real
//! service: the snapshot returned "as of" a timestamp is the latest revision
//! changed at or before it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::models::{BuildDefinitionRef, FieldSnapshot, GitRepositoryRef, ProjectRef, WorkItemId};
use crate::tracker::repository::*;

/// One recorded call to [`WorkItemRepository::fetch_items_as_of`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub ids: Vec<WorkItemId>,
    pub as_of: Option<DateTime<Utc>>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone)]
struct Revision {
    changed_at: DateTime<Utc>,
    fields: Map<String, Value>,
}

/// In-memory local repository.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use serde_json::json;
/// use wi_progress::models::WorkItemId;
/// use wi_progress::tracker::repositories::LocalRepository;
///
/// let repo = LocalRepository::new();
/// let created = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
/// repo.add_revision(
///     WorkItemId::new(1),
///     created,
///     json!({ "System.Title": "Deliverable" }).as_object().cloned().unwrap_or_default(),
/// );
/// assert_eq!(repo.item_count(), 1);
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    revisions: BTreeMap<WorkItemId, Vec<Revision>>,
    omitted: HashSet<WorkItemId>,

    projects: Vec<ProjectRef>,
    repositories: HashMap<String, Vec<GitRepositoryRef>>,
    build_definitions: HashMap<String, Vec<BuildDefinitionRef>>,

    fetch_log: Vec<FetchRequest>,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            revisions: BTreeMap::new(),
            omitted: HashSet::new(),
            projects: Vec::new(),
            repositories: HashMap::new(),
            build_definitions: HashMap::new(),
            fetch_log: Vec::new(),
            is_healthy: true,
        }
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Record a full field map for an item, effective from `changed_at`.
    ///
    /// Revisions may be added in any order; they are kept sorted by time.
    pub fn add_revision(
        &self,
        id: WorkItemId,
        changed_at: DateTime<Utc>,
        fields: Map<String, Value>,
    ) {
        let mut data = self.data.write();
        let history = data.revisions.entry(id).or_default();
        let pos = history.partition_point(|r| r.changed_at <= changed_at);
        history.insert(pos, Revision { changed_at, fields });
    }

    /// Change a single field at `changed_at`, carrying every other field over
    /// from the revision in effect at that time.
    pub fn set_field_at(
        &self,
        id: WorkItemId,
        changed_at: DateTime<Utc>,
        field: impl Into<String>,
        value: Value,
    ) {
        let mut fields = {
            let data = self.data.read();
            data.revisions
                .get(&id)
                .and_then(|history| {
                    revision_index_as_of(history, Some(changed_at))
                        .map(|i| history[i].fields.clone())
                })
                .unwrap_or_default()
        };
        fields.insert(field.into(), value);
        self.add_revision(id, changed_at, fields);
    }

    /// Make the service omit `id` from every fetch, as it does for deleted or
    /// inaccessible items.
    pub fn omit_item(&self, id: WorkItemId) {
        self.data.write().omitted.insert(id);
    }

    /// Register a project together with its repositories and build definitions.
    pub fn add_project(
        &self,
        project: ProjectRef,
        repositories: Vec<GitRepositoryRef>,
        build_definitions: Vec<BuildDefinitionRef>,
    ) {
        let mut data = self.data.write();
        data.repositories.insert(project.id.clone(), repositories);
        data.build_definitions
            .insert(project.id.clone(), build_definitions);
        data.projects.push(project);
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Number of distinct work items stored.
    pub fn item_count(&self) -> usize {
        self.data.read().revisions.len()
    }

    /// Every fetch request received so far, oldest first.
    pub fn fetch_log(&self) -> Vec<FetchRequest> {
        self.data.read().fetch_log.clone()
    }

    /// Number of fetch requests received so far.
    pub fn fetch_count(&self) -> usize {
        self.data.read().fetch_log.len()
    }

    /// Forget recorded fetch requests.
    pub fn clear_fetch_log(&self) {
        self.data.write().fetch_log.clear();
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    fn ensure_healthy(&self, operation: &str) -> RepositoryResult<()> {
        if self.data.read().is_healthy {
            Ok(())
        } else {
            Err(RepositoryError::connection_with_context(
                "Local repository marked unhealthy",
                ErrorContext::new(operation),
            ))
        }
    }
}

fn revision_index_as_of(history: &[Revision], as_of: Option<DateTime<Utc>>) -> Option<usize> {
    match as_of {
        None => history.len().checked_sub(1),
        Some(ts) => history
            .partition_point(|r| r.changed_at <= ts)
            .checked_sub(1),
    }
}

fn project_fields(fields: &Map<String, Value>, requested: &[String]) -> Map<String, Value> {
    if requested.is_empty() {
        return fields.clone();
    }
    requested
        .iter()
        .filter_map(|name| fields.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

#[async_trait]
impl WorkItemRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn query_item_ids(
        &self,
        query: &WorkItemQuery,
        top: Option<usize>,
    ) -> RepositoryResult<Vec<WorkItemId>> {
        self.ensure_healthy("query_item_ids")?;
        let data = self.data.read();

        let mut matches: Vec<(DateTime<Utc>, WorkItemId)> = data
            .revisions
            .iter()
            .filter_map(|(id, history)| history.last().map(|latest| (id, latest)))
            .filter(|(_, latest)| query.matches(&latest.fields))
            .map(|(id, latest)| (latest.changed_at, *id))
            .collect();

        // Most recently changed first, ties broken by id for determinism
        matches.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let limit = top.unwrap_or(usize::MAX);
        Ok(matches.into_iter().take(limit).map(|(_, id)| id).collect())
    }

    async fn fetch_items_as_of(
        &self,
        ids: &[WorkItemId],
        as_of: Option<DateTime<Utc>>,
        fields: &[String],
    ) -> RepositoryResult<Vec<FieldSnapshot>> {
        self.ensure_healthy("fetch_items_as_of")?;
        let mut data = self.data.write();
        data.fetch_log.push(FetchRequest {
            ids: ids.to_vec(),
            as_of,
            fields: fields.to_vec(),
        });

        let snapshots = ids
            .iter()
            .filter(|id| !data.omitted.contains(*id))
            .filter_map(|id| {
                let history = data.revisions.get(id)?;
                let index = revision_index_as_of(history, as_of)?;
                Some(FieldSnapshot {
                    id: *id,
                    rev: Some(index as i64 + 1),
                    fields: project_fields(&history[index].fields, fields),
                })
            })
            .collect();

        Ok(snapshots)
    }
}

#[async_trait]
impl CatalogRepository for LocalRepository {
    async fn list_projects(&self) -> RepositoryResult<Vec<ProjectRef>> {
        self.ensure_healthy("list_projects")?;
        Ok(self.data.read().projects.clone())
    }

    async fn list_repositories(
        &self,
        project: &ProjectRef,
    ) -> RepositoryResult<Vec<GitRepositoryRef>> {
        self.ensure_healthy("list_repositories")?;
        Ok(self
            .data
            .read()
            .repositories
            .get(&project.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_build_definitions(
        &self,
        project: &ProjectRef,
    ) -> RepositoryResult<Vec<BuildDefinitionRef>> {
        self.ensure_healthy("list_build_definitions")?;
        Ok(self
            .data
            .read()
            .build_definitions
            .get(&project.id)
            .cloned()
            .unwrap_or_default())
    }
}
