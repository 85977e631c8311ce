//! Catalog repository trait for account-level lookups.
//!
//! These back the run context's default project, repository and build
//! definition. Listings return whatever the account exposes; an empty list is
//! a valid answer and is turned into an error by the caller.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{BuildDefinitionRef, GitRepositoryRef, ProjectRef};

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// All projects visible to the caller, following continuation pages.
    async fn list_projects(&self) -> RepositoryResult<Vec<ProjectRef>>;

    /// Git repositories of a project.
    async fn list_repositories(&self, project: &ProjectRef)
        -> RepositoryResult<Vec<GitRepositoryRef>>;

    /// Build definitions of a project.
    async fn list_build_definitions(
        &self,
        project: &ProjectRef,
    ) -> RepositoryResult<Vec<BuildDefinitionRef>>;
}
