//! Tracker service layer.
//!
//! Thin functions over the repository traits that the report and extract
//! pipelines call. The default-entity lookups cache their first successful
//! result on the [`RunContext`].

use chrono::{DateTime, Utc};
use log::debug;
use serde_json::Value;

use super::context::RunContext;
use super::repository::{ErrorContext, RepositoryError, RepositoryResult, WorkItemRepository};
use crate::models::{BuildDefinitionRef, FieldSnapshot, GitRepositoryRef, ProjectRef, WorkItemId};

/// Fields returned by [`fetch_items_as_of`] when the caller names none.
pub const DEFAULT_FETCH_FIELDS: [&str; 2] = ["System.Id", "System.Tags"];

/// Largest id range a single selection may expand to.
pub const MAX_RANGE_LEN: u64 = 100_000;

/// Which work items a fetch covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSelection {
    /// Every id in `first..=last`.
    Range { first: WorkItemId, last: WorkItemId },
    /// Exactly these ids, in this order.
    List(Vec<WorkItemId>),
}

impl IdSelection {
    pub fn range(first: i64, last: i64) -> Self {
        IdSelection::Range {
            first: WorkItemId::new(first),
            last: WorkItemId::new(last),
        }
    }

    /// Expand into the ordered id list. An inverted range is empty.
    ///
    /// # Errors
    /// `ValidationError` when a range spans more than [`MAX_RANGE_LEN`] ids.
    pub fn to_ids(&self) -> RepositoryResult<Vec<WorkItemId>> {
        match self {
            IdSelection::Range { first, last } => {
                let (first, last) = (first.value(), last.value());
                if last < first {
                    return Ok(Vec::new());
                }
                let len = (i128::from(last) - i128::from(first) + 1) as u128;
                if len > u128::from(MAX_RANGE_LEN) {
                    return Err(RepositoryError::validation_with_context(
                        format!(
                            "Id range {}..={} spans {} ids, more than the limit of {}",
                            first, last, len, MAX_RANGE_LEN
                        ),
                        ErrorContext::new("fetch_items_as_of").with_entity("work_item"),
                    ));
                }
                Ok((first..=last).map(WorkItemId::new).collect())
            }
            IdSelection::List(ids) => Ok(ids.clone()),
        }
    }
}

impl From<Vec<WorkItemId>> for IdSelection {
    fn from(ids: Vec<WorkItemId>) -> Self {
        IdSelection::List(ids)
    }
}

/// Field snapshots of the selected items as they were at `as_of`.
///
/// `as_of` defaults to now and `fields` to [`DEFAULT_FETCH_FIELDS`]. Items the
/// service cannot resolve are skipped, so the result may be shorter than the
/// selection.
pub async fn fetch_items_as_of<R>(
    repo: &R,
    ids: &IdSelection,
    as_of: Option<DateTime<Utc>>,
    fields: Option<&[String]>,
) -> RepositoryResult<Vec<FieldSnapshot>>
where
    R: WorkItemRepository + ?Sized,
{
    let ids = ids.to_ids()?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let as_of = as_of.unwrap_or_else(Utc::now);
    let fields: Vec<String> = match fields {
        Some(f) => f.to_vec(),
        None => DEFAULT_FETCH_FIELDS.iter().map(|f| f.to_string()).collect(),
    };

    debug!(
        "Fetching {} work items as of {} ({} fields)",
        ids.len(),
        as_of,
        fields.len()
    );
    repo.fetch_items_as_of(&ids, Some(as_of), &fields).await
}

/// Value of a single field of one item at `as_of`.
///
/// `Ok(None)` when the item is unresolvable at that time or the field is
/// unset.
pub async fn work_item_field_as_of<R>(
    repo: &R,
    id: WorkItemId,
    field: &str,
    as_of: DateTime<Utc>,
) -> RepositoryResult<Option<Value>>
where
    R: WorkItemRepository + ?Sized,
{
    let fields = [field.to_string()];
    let snapshots = fetch_items_as_of(
        repo,
        &IdSelection::List(vec![id]),
        Some(as_of),
        Some(&fields[..]),
    )
    .await?;
    let value = snapshots
        .into_iter()
        .find(|s| s.id == id)
        .and_then(|s| s.get(field).cloned());
    debug!("Field {} of work item {} as of {}: {:?}", field, id, as_of, value);
    Ok(value)
}

/// The run's default project.
///
/// When `azure.project` is configured the project with that name is chosen;
/// otherwise the first project the account lists.
pub async fn find_any_project(ctx: &RunContext) -> RepositoryResult<ProjectRef> {
    debug!("finding any project");
    if let Some(project) = ctx.cache().project() {
        debug!("using cached project {}", project.name);
        return Ok(project.clone());
    }

    let preferred = ctx.config().azure.project.clone();
    let project = ctx
        .cache()
        .project
        .get_or_try_init(|| async {
            let projects = ctx.repo().list_projects().await?;
            let chosen = match preferred {
                Some(ref name) => projects
                    .into_iter()
                    .find(|p| p.name.eq_ignore_ascii_case(name))
                    .ok_or_else(|| {
                        RepositoryError::not_found_with_context(
                            format!("Project '{}' is not visible to this account", name),
                            ErrorContext::new("find_any_project").with_entity("project"),
                        )
                    })?,
                None => projects.into_iter().next().ok_or_else(|| {
                    RepositoryError::not_found_with_context(
                        "Your account doesn't appear to have any projects available",
                        ErrorContext::new("find_any_project").with_entity("project"),
                    )
                })?,
            };
            debug!("found {}", chosen.name);
            Ok::<_, RepositoryError>(chosen)
        })
        .await?;
    Ok(project.clone())
}

/// The first git repository of the default project.
pub async fn find_any_repo(ctx: &RunContext) -> RepositoryResult<GitRepositoryRef> {
    debug!("finding any repo");
    if let Some(repo) = ctx.cache().repository() {
        debug!("using cached repo {}", repo.name);
        return Ok(repo.clone());
    }

    let repository = ctx
        .cache()
        .repository
        .get_or_try_init(|| async {
            let project = find_any_project(ctx).await?;
            let repos = ctx.repo().list_repositories(&project).await?;
            repos.into_iter().next().ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Project \"{}\" doesn't appear to have any repos", project.name),
                    ErrorContext::new("find_any_repo")
                        .with_entity("git_repository")
                        .with_entity_id(&project.id),
                )
            })
        })
        .await?;
    Ok(repository.clone())
}

/// The first build definition of the default project.
pub async fn find_any_build_definition(ctx: &RunContext) -> RepositoryResult<BuildDefinitionRef> {
    debug!("finding any build definition");
    if let Some(definition) = ctx.cache().build_definition() {
        debug!("using cached definition {}", definition.name);
        return Ok(definition.clone());
    }

    let definition = ctx
        .cache()
        .build_definition
        .get_or_try_init(|| async {
            let project = find_any_project(ctx).await?;
            let definitions = ctx.repo().list_build_definitions(&project).await?;
            definitions.into_iter().next().ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!(
                        "Project \"{}\" doesn't appear to have any build definitions",
                        project.name
                    ),
                    ErrorContext::new("find_any_build_definition")
                        .with_entity("build_definition")
                        .with_entity_id(&project.id),
                )
            })
        })
        .await?;
    Ok(definition.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tracker::repositories::LocalRepository;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn config(extra: &str) -> AppConfig {
        AppConfig::from_toml_str(&format!(
            r#"
[repository]
type = "local"
{}
[report]
project_start_date = "2024-01-01"
project_end_date = "2024-03-01"
"#,
            extra
        ))
        .unwrap()
    }

    fn project(id: &str, name: &str) -> ProjectRef {
        ProjectRef {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_id_selection_expands() {
        assert_eq!(
            IdSelection::range(3, 5).to_ids().unwrap(),
            vec![WorkItemId::new(3), WorkItemId::new(4), WorkItemId::new(5)]
        );
        assert!(IdSelection::range(5, 3).to_ids().unwrap().is_empty());
        let list = IdSelection::from(vec![WorkItemId::new(9), WorkItemId::new(2)]);
        assert_eq!(
            list.to_ids().unwrap(),
            vec![WorkItemId::new(9), WorkItemId::new(2)]
        );
    }

    #[test]
    fn test_oversized_range_is_rejected() {
        let limit = MAX_RANGE_LEN as i64;
        let full = IdSelection::range(1, limit).to_ids().unwrap();
        assert_eq!(full.len(), limit as usize);

        let err = IdSelection::range(1, limit + 1).to_ids().unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError { .. }));
        assert!(IdSelection::range(1, i64::MAX).to_ids().is_err());
        assert!(IdSelection::range(i64::MIN, i64::MAX).to_ids().is_err());
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_range_without_calling_service() {
        let repo = LocalRepository::new();

        let err = fetch_items_as_of(&repo, &IdSelection::range(1, i64::MAX), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::ValidationError { .. }));
        assert_eq!(repo.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_defaults_fields_and_skips_unknown_ids() {
        let repo = LocalRepository::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for id in [1, 3] {
            repo.add_revision(
                WorkItemId::new(id),
                t0,
                json!({"System.Id": id, "System.Tags": "a; b", "System.Title": "x"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            );
        }

        let snapshots = fetch_items_as_of(&repo, &IdSelection::range(1, 3), None, None)
            .await
            .unwrap();

        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[0].get("System.Title").is_none());
        assert_eq!(snapshots[0].get("System.Tags"), Some(&json!("a; b")));

        let log = repo.fetch_log();
        assert_eq!(log[0].fields, vec!["System.Id", "System.Tags"]);
        assert!(log[0].as_of.is_some());
    }

    #[tokio::test]
    async fn test_work_item_field_as_of() {
        let repo = LocalRepository::new();
        let id = WorkItemId::new(7);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        repo.set_field_at(id, t0, "System.AreaPath", json!("Org\\A"));
        repo.set_field_at(id, t1, "System.AreaPath", json!("Org\\B"));

        let before = work_item_field_as_of(&repo, id, "System.AreaPath", t0)
            .await
            .unwrap();
        let after = work_item_field_as_of(&repo, id, "System.AreaPath", t1)
            .await
            .unwrap();
        let unset = work_item_field_as_of(&repo, id, "System.Tags", t1)
            .await
            .unwrap();

        assert_eq!(before, Some(json!("Org\\A")));
        assert_eq!(after, Some(json!("Org\\B")));
        assert_eq!(unset, None);

        let log = repo.fetch_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].ids, vec![id]);
        assert_eq!(log[0].fields, vec!["System.AreaPath".to_string()]);
        assert_eq!(log[0].as_of, Some(t0));
    }

    #[tokio::test]
    async fn test_lookups_are_cached_after_first_success() {
        let repo = Arc::new(LocalRepository::new());
        repo.add_project(
            project("p1", "Programme"),
            vec![GitRepositoryRef {
                id: "r1".to_string(),
                name: "main-repo".to_string(),
            }],
            vec![BuildDefinitionRef {
                id: 12,
                name: "CI".to_string(),
            }],
        );
        let ctx = RunContext::new(config(""), repo.clone());

        assert_eq!(find_any_project(&ctx).await.unwrap().name, "Programme");
        assert_eq!(find_any_repo(&ctx).await.unwrap().name, "main-repo");
        assert_eq!(find_any_build_definition(&ctx).await.unwrap().id, 12);

        // Cached values survive the service going away
        repo.set_healthy(false);
        assert_eq!(find_any_project(&ctx).await.unwrap().id, "p1");
        assert_eq!(find_any_repo(&ctx).await.unwrap().id, "r1");
        assert_eq!(ctx.cache().build_definition().map(|d| d.id), Some(12));
    }

    #[tokio::test]
    async fn test_empty_account_is_not_found() {
        let repo = Arc::new(LocalRepository::new());
        let ctx = RunContext::new(config(""), repo.clone());

        let err = find_any_project(&ctx).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert!(ctx.cache().project().is_none());

        repo.add_project(project("p1", "Empty"), vec![], vec![]);
        let err = find_any_repo(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("doesn't appear to have any repos"));
        let err = find_any_build_definition(&ctx).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert!(ctx.cache().project().is_some());
    }

    #[tokio::test]
    async fn test_configured_project_is_preferred() {
        let repo = Arc::new(LocalRepository::new());
        repo.add_project(project("p1", "First"), vec![], vec![]);
        repo.add_project(project("p2", "Second"), vec![], vec![]);

        let ctx = RunContext::new(config("[azure]\nproject = \"second\"\n"), repo.clone());
        assert_eq!(find_any_project(&ctx).await.unwrap().id, "p2");

        let ctx = RunContext::new(config("[azure]\nproject = \"Third\"\n"), repo);
        assert!(matches!(
            find_any_project(&ctx).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }
}
