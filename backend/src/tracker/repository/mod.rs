//! Repository trait definitions for the tracking service.
//!
//! The tracking service is split across two focused traits:
//!
//! - [`work_items`]: id queries and point-in-time field fetches
//! - [`catalog`]: projects, git repositories and build definitions
//! - [`error`]: Error types shared by both
//!
//! # Convenience Trait Bound
//!
//! For code that needs both, use the [`FullRepository`] trait bound:
//!
//! ```ignore
//! async fn run<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<()> {
//!     let projects = repo.list_projects().await?;
//!     let ids = repo.query_item_ids(&WorkItemQuery::default(), Some(30)).await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod work_items;

pub use catalog::CatalogRepository;
pub use error::{ErrorContext, RepositoryError, RepositoryResult};
pub use work_items::{WorkItemQuery, WorkItemRepository};

/// Composite trait bound for a complete tracking-service implementation.
pub trait FullRepository: WorkItemRepository + CatalogRepository {}

// Blanket implementation: anything implementing both traits is a FullRepository
impl<T> FullRepository for T where T: WorkItemRepository + CatalogRepository {}
