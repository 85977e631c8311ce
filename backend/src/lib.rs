//! # Work Item Progress
//!
//! Weekly forecast/actual progress reconstruction for tracked work items.
//!
//! For every tracked deliverable with a planned "green" (optimistic) and
//! "red" (pessimistic) date window, the crate rebuilds a week-by-week table of
//! forecast completion next to the actual completion the item reported at
//! that time, read from the tracking service's point-in-time history.
//!
//! ## Architecture
//!
//! - [`models`]: work items, progress rows and calendar arithmetic
//! - [`tracker`]: tracking-service repository traits, the Azure DevOps and
//!   in-memory implementations, and the per-run context
//! - [`services`]: progress calculation, the weekly series driver, table
//!   assembly, exporters and the work item extract
//! - [`config`]: TOML run configuration
//!
//! ## Example
//!
//! ```ignore
//! use wi_progress::config::AppConfig;
//! use wi_progress::services::run_report;
//! use wi_progress::tracker::{RepositoryFactory, RunContext};
//!
//! let config = AppConfig::from_default_location()?;
//! let repo = RepositoryFactory::create(&config)?;
//! let ctx = RunContext::new(config, repo);
//! let summary = run_report(&ctx, chrono::Utc::now().date_naive(), false).await?;
//! ```

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod config;
pub mod models;
pub mod services;
pub mod tracker;
