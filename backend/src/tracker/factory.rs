//! Repository factory for dependency injection.
//!
//! Selects and builds the tracking-service backend named in the run
//! configuration.

use std::str::FromStr;
use std::sync::Arc;

use log::info;

use super::repositories::LocalRepository;
#[cfg(feature = "azure-repo")]
use super::repositories::{AzureDevOpsConfig, AzureDevOpsRepository};
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use crate::config::AppConfig;

/// Repository type configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Azure DevOps REST implementation
    Azure,
    /// In-memory local repository
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    /// Parse repository type from string.
    ///
    /// # Arguments
    /// * `s` - String representation ("azure", "ado", "local")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azure" | "ado" | "azure-devops" => Ok(Self::Azure),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

/// Repository factory for creating repository instances.
///
/// # Example
/// ```ignore
/// use wi_progress::config::AppConfig;
/// use wi_progress::tracker::RepositoryFactory;
///
/// let config = AppConfig::from_default_location()?;
/// let repo = RepositoryFactory::create(&config)?;
/// let healthy = repo.health_check().await?;
/// ```
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create the repository named by `config.repository.type`.
    ///
    /// # Returns
    /// * `Ok(Arc<dyn FullRepository>)` - Repository instance
    /// * `Err(RepositoryError::ConfigurationError)` - Unknown type, missing
    ///   settings, or a backend whose feature is not enabled
    pub fn create(config: &AppConfig) -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo_type = config.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        match repo_type {
            RepositoryType::Azure => {
                #[cfg(feature = "azure-repo")]
                {
                    let azure = Self::create_azure(config.to_azure_config())?;
                    Ok(azure as Arc<dyn FullRepository>)
                }
                #[cfg(not(feature = "azure-repo"))]
                {
                    Err(RepositoryError::configuration(
                        "Azure repository feature not enabled",
                    ))
                }
            }
            RepositoryType::Local => Ok(Self::create_local()),
        }
    }

    /// Create an Azure DevOps repository.
    #[cfg(feature = "azure-repo")]
    pub fn create_azure(config: AzureDevOpsConfig) -> RepositoryResult<Arc<AzureDevOpsRepository>> {
        info!(
            "Connecting to Azure DevOps at {} (api-version {})",
            config.organization_url, config.api_version
        );
        let repo = AzureDevOpsRepository::new(config)?;
        Ok(Arc::new(repo))
    }

    /// Create an in-memory local repository.
    pub fn create_local() -> Arc<dyn FullRepository> {
        info!("Using in-memory local repository");
        Arc::new(LocalRepository::new())
    }
}
