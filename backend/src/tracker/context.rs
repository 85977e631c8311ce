//! Per-run state shared by the tracker services.

use std::sync::Arc;

use tokio::sync::OnceCell;

use super::repository::FullRepository;
use crate::config::AppConfig;
use crate::models::{BuildDefinitionRef, GitRepositoryRef, ProjectRef};

/// Entities looked up at most once per run.
///
/// Each slot is filled by the first successful lookup and is read-only
/// afterwards. Failed lookups leave the slot empty.
#[derive(Debug, Default)]
pub struct LookupCache {
    pub(crate) project: OnceCell<ProjectRef>,
    pub(crate) repository: OnceCell<GitRepositoryRef>,
    pub(crate) build_definition: OnceCell<BuildDefinitionRef>,
}

impl LookupCache {
    pub fn project(&self) -> Option<&ProjectRef> {
        self.project.get()
    }

    pub fn repository(&self) -> Option<&GitRepositoryRef> {
        self.repository.get()
    }

    pub fn build_definition(&self) -> Option<&BuildDefinitionRef> {
        self.build_definition.get()
    }
}

/// Configuration, repository and lookup cache of one run.
///
/// Created by the driver at start-up and dropped when the run ends.
pub struct RunContext {
    config: Arc<AppConfig>,
    repo: Arc<dyn FullRepository>,
    cache: LookupCache,
}

impl RunContext {
    pub fn new(config: AppConfig, repo: Arc<dyn FullRepository>) -> Self {
        Self {
            config: Arc::new(config),
            repo,
            cache: LookupCache::default(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The tracking-service repository of this run.
    pub fn repo(&self) -> &dyn FullRepository {
        self.repo.as_ref()
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
