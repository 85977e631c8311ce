//! Run configuration file support.
//!
//! A run is configured from a single TOML file (`progress.toml` by default)
//! holding the repository backend selection, the Azure DevOps connection, the
//! report window and the work item query.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::{FieldNames, MissingActualPolicy};
use crate::tracker::factory::RepositoryType;
use crate::tracker::repository::{RepositoryError, RepositoryResult, WorkItemQuery};

/// File name searched for when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "progress.toml";

/// Environment variable that overrides `azure.pat`.
pub const PAT_ENV_VAR: &str = "AZURE_DEVOPS_PAT";

/// Complete run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub azure: AzureSettings,
    pub report: ReportSettings,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub test_run: TestRunSettings,
}

/// Repository type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: default_repo_type(),
        }
    }
}

/// Azure DevOps connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AzureSettings {
    #[serde(default)]
    pub organization_url: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default, skip_serializing)]
    pub pat: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for AzureSettings {
    fn default() -> Self {
        Self {
            organization_url: String::new(),
            project: None,
            pat: String::new(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl std::fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSettings")
            .field("organization_url", &self.organization_url)
            .field("project", &self.project)
            .field("pat", &if self.pat.is_empty() { "" } else { "***" })
            .field("api_version", &self.api_version)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

/// Report window and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    pub project_start_date: NaiveDate,
    pub project_end_date: NaiveDate,
    #[serde(default)]
    pub test_run: bool,
    #[serde(default = "default_true")]
    pub future_actuals_are_none: bool,
    #[serde(default)]
    pub missing_actual: MissingActualPolicy,
    /// Extra fields fetched with the item set, on top of the typed ones.
    #[serde(default)]
    pub fields_array: Vec<String>,
    #[serde(default)]
    pub fields: FieldNames,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<OutputFormat>,
}

/// Formats the progress table can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    /// File extension used for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Work item selection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerySettings {
    #[serde(default)]
    pub work_item_types: Vec<String>,
    #[serde(default)]
    pub area_path: Option<String>,
    #[serde(default)]
    pub top: Option<usize>,
}

/// Bounds applied in test-run mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TestRunSettings {
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
}

impl Default for TestRunSettings {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_checkpoints: default_max_checkpoints(),
        }
    }
}

fn default_repo_type() -> String {
    "azure".to_string()
}

fn default_api_version() -> String {
    "7.0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_output_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Csv, OutputFormat::Json]
}

fn default_max_items() -> usize {
    1
}

fn default_max_checkpoints() -> usize {
    2
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// The `AZURE_DEVOPS_PAT` environment variable, when set and non-empty,
    /// replaces `azure.pat`. The result is validated.
    ///
    /// # Returns
    /// * `Ok(AppConfig)` if successful
    /// * `Err(RepositoryError::ConfigurationError)` if the file cannot be read,
    ///   parsed or validated
    pub fn from_file<P: AsRef<Path>>(path: P) -> RepositoryResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RepositoryError::configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text without environment overrides or
    /// validation.
    pub fn from_toml_str(content: &str) -> RepositoryResult<Self> {
        toml::from_str(content).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `progress.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> RepositoryResult<Self> {
        let search_paths = [
            PathBuf::from(DEFAULT_CONFIG_FILE),
            PathBuf::from("backend").join(DEFAULT_CONFIG_FILE),
            PathBuf::from("..").join(DEFAULT_CONFIG_FILE),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(RepositoryError::configuration(format!(
            "No {} found in standard locations",
            DEFAULT_CONFIG_FILE
        )))
    }

    /// Replace the token with `AZURE_DEVOPS_PAT` when it is set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(pat) = std::env::var(PAT_ENV_VAR) {
            if !pat.trim().is_empty() {
                self.azure.pat = pat;
            }
        }
    }

    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> Result<RepositoryType, String> {
        RepositoryType::from_str(&self.repository.repo_type)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> RepositoryResult<()> {
        let repo_type = self.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        if self.report.project_end_date < self.report.project_start_date {
            return Err(RepositoryError::configuration(format!(
                "report.project_end_date ({}) is before report.project_start_date ({})",
                self.report.project_end_date, self.report.project_start_date
            )));
        }

        if repo_type == RepositoryType::Azure {
            if self.azure.organization_url.trim().is_empty() {
                return Err(RepositoryError::configuration(
                    "Azure repository requires 'azure.organization_url' setting",
                ));
            }
            if self.azure.pat.trim().is_empty() {
                return Err(RepositoryError::configuration(format!(
                    "Azure repository requires 'azure.pat' or the {} environment variable",
                    PAT_ENV_VAR
                )));
            }
        }

        if self.report.output_formats.is_empty() {
            return Err(RepositoryError::configuration(
                "report.output_formats must name at least one format",
            ));
        }

        Ok(())
    }

    /// The WIQL filter for the item set.
    pub fn work_item_query(&self) -> WorkItemQuery {
        WorkItemQuery {
            work_item_types: self.query.work_item_types.clone(),
            area_path: self.query.area_path.clone(),
        }
    }

    /// Fields fetched for the item set: `System.Id`, the typed fields and
    /// `fields_array`, without duplicates.
    pub fn item_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = vec!["System.Id".to_string()];
        let typed = self.report.fields.all();
        let extra = self.report.fields_array.iter().map(String::as_str);
        for field in typed.into_iter().chain(extra) {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        fields
    }

    /// Convert to the Azure repository configuration.
    #[cfg(feature = "azure-repo")]
    pub fn to_azure_config(&self) -> crate::tracker::repositories::AzureDevOpsConfig {
        crate::tracker::repositories::AzureDevOpsConfig {
            organization_url: self.azure.organization_url.clone(),
            project: self.azure.project.clone(),
            pat: self.azure.pat.clone(),
            api_version: self.azure.api_version.clone(),
            timeout_sec: self.azure.timeout_secs,
            max_retries: self.azure.max_retries,
            retry_delay_ms: self.azure.retry_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LOCAL: &str = r#"
[repository]
type = "local"

[report]
project_start_date = "2024-01-01"
project_end_date = "2024-03-01"
"#;

    #[test]
    fn test_parse_minimal_config_applies_defaults() {
        let config = AppConfig::from_toml_str(LOCAL).unwrap();
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Local);
        assert!(!config.report.test_run);
        assert!(config.report.future_actuals_are_none);
        assert_eq!(config.report.missing_actual, MissingActualPolicy::Zero);
        assert_eq!(
            config.report.output_formats,
            vec![OutputFormat::Csv, OutputFormat::Json]
        );
        assert_eq!(config.report.output_dir, PathBuf::from("out"));
        assert_eq!(config.test_run.max_items, 1);
        assert_eq!(config.test_run.max_checkpoints, 2);
        assert_eq!(config.azure.api_version, "7.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[repository]
type = "azure"

[azure]
organization_url = "https://dev.azure.com/MyOrg"
project = "Programme"
pat = "abc"
api_version = "7.1"
timeout_secs = 10
max_retries = 5
retry_delay_ms = 100

[report]
project_start_date = "2024-01-01"
project_end_date = "2024-12-31"
test_run = true
future_actuals_are_none = false
missing_actual = "unknown"
fields_array = ["System.AreaPath", "System.Title"]
output_dir = "reports"
output_formats = ["json"]

[report.fields]
progress_percent = "Custom.Progress"

[query]
work_item_types = ["Deliverable"]
area_path = "Programme\\Wave 1"
top = 50

[test_run]
max_items = 3
max_checkpoints = 4
"#;
        let config = AppConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Azure);
        assert_eq!(config.azure.project.as_deref(), Some("Programme"));
        assert_eq!(config.report.missing_actual, MissingActualPolicy::Unknown);
        assert_eq!(config.report.fields.progress_percent, "Custom.Progress");
        assert_eq!(config.report.fields.green_start, "Custom.GreenStartDate");
        assert_eq!(config.report.output_formats, vec![OutputFormat::Json]);
        assert_eq!(config.query.top, Some(50));
        assert_eq!(
            config.work_item_query().area_path.as_deref(),
            Some("Programme\\Wave 1")
        );
        assert_eq!(config.test_run.max_items, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let toml = LOCAL.replace("2024-03-01", "2023-12-01");
        let config = AppConfig::from_toml_str(&toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RepositoryError::ConfigurationError { .. }));
    }

    #[test]
    fn test_azure_requires_url_and_pat() {
        let toml = LOCAL.replace("\"local\"", "\"azure\"");
        let mut config = AppConfig::from_toml_str(&toml).unwrap();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("organization_url"));

        config.azure.organization_url = "https://dev.azure.com/MyOrg".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("pat"));

        config.azure.pat = "token".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_repository_type_is_rejected() {
        let toml = LOCAL.replace("\"local\"", "\"jira\"");
        let config = AppConfig::from_toml_str(&toml).unwrap();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Invalid repository type"));
    }

    #[test]
    fn test_missing_report_section_fails_to_parse() {
        let err = AppConfig::from_toml_str("[repository]\ntype = \"local\"\n").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_item_fields_are_deduplicated() {
        let mut config = AppConfig::from_toml_str(LOCAL).unwrap();
        config.report.fields_array = vec![
            "System.Title".to_string(),
            "System.AreaPath".to_string(),
            "System.Id".to_string(),
        ];
        let fields = config.item_fields();
        assert_eq!(fields[0], "System.Id");
        assert_eq!(fields.iter().filter(|f| *f == "System.Title").count(), 1);
        assert_eq!(fields.last().map(String::as_str), Some("System.AreaPath"));
    }

    #[test]
    fn test_from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LOCAL.as_bytes()).unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.report.project_start_date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );

        let err = AppConfig::from_file(file.path().with_extension("missing")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_debug_hides_pat() {
        let settings = AzureSettings {
            pat: "super-secret".to_string(),
            ..Default::default()
        };
        assert!(!format!("{:?}", settings).contains("super-secret"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = AppConfig::from_toml_str(include_str!("../progress.example.toml")).unwrap();
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Azure);
        assert_eq!(config.query.work_item_types, vec!["Deliverable".to_string()]);
        assert_eq!(config.report.fields, FieldNames::default());
    }
}
