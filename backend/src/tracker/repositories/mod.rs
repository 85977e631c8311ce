//! Repository implementations module.
//!
//! This module contains the implementations of the tracking-service traits:
//! - `azure`: Azure DevOps REST implementation over reqwest
//! - `local`: In-memory implementation for unit testing and offline runs
#[cfg(feature = "azure-repo")]
pub mod azure;
pub mod local;

#[cfg(feature = "azure-repo")]
pub use azure::{AzureDevOpsConfig, AzureDevOpsRepository};
pub use local::{FetchRequest, LocalRepository};
