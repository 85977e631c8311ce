//! Tracking-service access layer.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  services (report, extract, CLI)                          │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  tracker::services - fetch helpers, cached lookups        │
//! │  tracker::context  - RunContext                           │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  tracker::repository - WorkItemRepository,                │
//! │                        CatalogRepository                  │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//!       ┌─────────────┴──────────────┐
//!       │ AzureDevOpsRepository      │ LocalRepository
//!       │ (REST, reqwest)            │ (in-memory)
//!       └────────────────────────────┘
//! ```
//!
//! Use [`factory::RepositoryFactory`] to build the backend named in the run
//! configuration.

#[cfg(not(any(feature = "azure-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod context;
pub mod factory;
pub mod repositories;
pub mod repository;
pub mod services;

pub use context::{LookupCache, RunContext};
pub use factory::{RepositoryFactory, RepositoryType};
pub use repository::{
    CatalogRepository, ErrorContext, FullRepository, RepositoryError, RepositoryResult,
    WorkItemQuery, WorkItemRepository,
};
