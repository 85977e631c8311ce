//! Azure DevOps repository implementation over the REST API.
//!
//! ## Features
//!
//! - Personal access token (PAT) basic authentication
//! - Bounded per-request timeout
//! - Automatic retry with exponential backoff for transient failures
//! - Batched point-in-time work item fetches (`errorPolicy=omit`)
//!
//! The connection settings come from the `[azure]` table of the run
//! configuration, see `AppConfig::to_azure_config`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::models::{BuildDefinitionRef, FieldSnapshot, GitRepositoryRef, ProjectRef, WorkItemId};
use crate::tracker::repository::{
    CatalogRepository, ErrorContext, RepositoryError, RepositoryResult, WorkItemQuery,
    WorkItemRepository,
};

pub mod models;

use models::*;

/// Maximum number of ids the work item batch endpoint accepts per request.
pub const MAX_BATCH_SIZE: usize = 200;

const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Configuration for connecting to Azure DevOps.
#[derive(Clone)]
pub struct AzureDevOpsConfig {
    /// Organization url, e.g. `https://dev.azure.com/MyOrg`
    pub organization_url: String,
    /// Project used to scope WIQL queries; organization-wide when `None`
    pub project: Option<String>,
    /// Personal access token
    pub pat: String,
    /// REST api-version sent with every request
    pub api_version: String,
    /// Per-request timeout in seconds
    pub timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for AzureDevOpsConfig {
    fn default() -> Self {
        Self {
            organization_url: String::new(),
            project: None,
            pat: String::new(),
            api_version: "7.0".to_string(),
            timeout_sec: 30,
            max_retries: 3,
            retry_delay_ms: 250,
        }
    }
}

impl std::fmt::Debug for AzureDevOpsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevOpsConfig")
            .field("organization_url", &self.organization_url)
            .field("project", &self.project)
            .field("pat", &"***")
            .field("api_version", &self.api_version)
            .field("timeout_sec", &self.timeout_sec)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

impl AzureDevOpsConfig {
    /// Create a configuration for an organization and token.
    pub fn new(organization_url: impl Into<String>, pat: impl Into<String>) -> Self {
        Self {
            organization_url: organization_url.into(),
            pat: pat.into(),
            ..Default::default()
        }
    }
}

/// REST-backed repository for an Azure DevOps organization.
#[derive(Clone, Debug)]
pub struct AzureDevOpsRepository {
    client: Client,
    base_url: Url,
    config: AzureDevOpsConfig,
    retried_operations: Arc<AtomicU64>,
}

impl AzureDevOpsRepository {
    /// Create a new repository.
    ///
    /// # Returns
    /// * `Ok(AzureDevOpsRepository)` on success
    /// * `Err(RepositoryError::ConfigurationError)` if the url or token is unusable
    pub fn new(config: AzureDevOpsConfig) -> RepositoryResult<Self> {
        if config.pat.trim().is_empty() {
            return Err(RepositoryError::configuration(
                "Azure DevOps repository requires a personal access token",
            ));
        }

        let base_url = Url::parse(config.organization_url.trim_end_matches('/')).map_err(|e| {
            RepositoryError::configuration(format!(
                "Invalid organization url '{}': {}",
                config.organization_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RepositoryError::configuration(format!(
                "Organization url '{}' cannot be used as a base url",
                config.organization_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                RepositoryError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            config,
            retried_operations: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Total operations that needed at least one retry.
    pub fn retried_operations(&self) -> u64 {
        self.retried_operations.load(Ordering::Relaxed)
    }

    /// Build `{org}[/{project}]/_apis/{path..}?api-version=..`.
    fn endpoint(&self, project: Option<&str>, path: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            if let Some(project) = project {
                segments.push(project);
            }
            segments.push("_apis");
            segments.extend(path);
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.config.api_version);
        url
    }

    /// Execute an operation with automatic retry for transient failures.
    ///
    /// Retries up to `max_retries` times when the error is retryable
    /// (connection errors, timeouts, throttling and server errors).
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut f: F) -> RepositoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        let max_retries = self.config.max_retries;
        let mut retry_delay = Duration::from_millis(self.config.retry_delay_ms);

        let mut attempt = 0;
        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    if attempt == 1 {
                        self.retried_operations.fetch_add(1, Ordering::Relaxed);
                    }
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        attempt,
                        max_retries + 1,
                        retry_delay,
                        e
                    );
                    tokio::time::sleep(retry_delay).await;
                    retry_delay *= 2; // Exponential backoff
                }
                Err(e) => {
                    return Err(e.with_operation(operation));
                }
            }
        }
    }

    /// Send a request built by `build` and decode its JSON body.
    ///
    /// Returns the decoded body together with the continuation token header,
    /// when the service sent one.
    async fn execute<T, B>(
        &self,
        operation: &str,
        build: B,
    ) -> RepositoryResult<(T, Option<String>)>
    where
        T: DeserializeOwned,
        B: Fn(&Client) -> RequestBuilder,
    {
        let this = self;
        let build = &build;
        self.with_retry(operation, move || async move {
            let response = build(&this.client)
                .basic_auth("", Some(&this.config.pat))
                .send()
                .await?;

            let continuation = response
                .headers()
                .get(CONTINUATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() || status == StatusCode::NON_AUTHORITATIVE_INFORMATION {
                return Err(status_error(status, &body, operation));
            }

            let de = &mut serde_json::Deserializer::from_str(&body);
            let value: T = serde_path_to_error::deserialize(de).map_err(|e| {
                RepositoryError::validation_with_context(
                    format!("Failed to parse response: {}", e.inner()),
                    ErrorContext::new(operation).with_details(format!("path={}", e.path())),
                )
            })?;
            Ok((value, continuation))
        })
        .await
    }

    async fn fetch_batch(
        &self,
        ids: &[WorkItemId],
        as_of: Option<DateTime<Utc>>,
        fields: &[String],
    ) -> RepositoryResult<Vec<FieldSnapshot>> {
        let url = self.endpoint(None, &["wit", "workitems"]);
        let id_list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut params = vec![("ids", id_list), ("errorPolicy", "omit".to_string())];
        if !fields.is_empty() {
            params.push(("fields", fields.join(",")));
        }
        if let Some(ts) = as_of {
            params.push(("asOf", ts.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let (batch, _): (WorkItemBatch, _) = self
            .execute("fetch_items_as_of", |client| {
                client.get(url.clone()).query(&params)
            })
            .await?;

        Ok(batch.value.into_iter().flatten().map(Into::into).collect())
    }
}

/// Translate a non-success response into a repository error.
fn status_error(status: StatusCode, body: &str, operation: &str) -> RepositoryError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "<empty response>".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        });
    let message = format!("{} ({})", message, status);
    let context = ErrorContext::new(operation).with_details(format!("status={}", status.as_u16()));

    match status {
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NON_AUTHORITATIVE_INFORMATION => RepositoryError::AuthenticationError {
            message: format!("Credentials rejected: {}", message),
            context,
        },
        StatusCode::NOT_FOUND => RepositoryError::not_found_with_context(message, context),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RepositoryError::request_with_context(message, context.retryable())
        }
        s if s.is_server_error() => {
            RepositoryError::request_with_context(message, context.retryable())
        }
        _ => RepositoryError::request_with_context(message, context),
    }
}

#[async_trait]
impl WorkItemRepository for AzureDevOpsRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        let url = self.endpoint(None, &["projects"]);
        let result: RepositoryResult<(ListResponse<TeamProjectReference>, _)> = self
            .execute("health_check", |client| {
                client.get(url.clone()).query(&[("$top", "1")])
            })
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(RepositoryError::AuthenticationError { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn query_item_ids(
        &self,
        query: &WorkItemQuery,
        top: Option<usize>,
    ) -> RepositoryResult<Vec<WorkItemId>> {
        let url = self.endpoint(self.config.project.as_deref(), &["wit", "wiql"]);
        let wiql = query.to_wiql();
        debug!("Running WIQL (top={:?}): {}", top, wiql);

        let top_param = top.map(|t| t.to_string());
        let (result, _): (WorkItemQueryResult, _) = self
            .execute("query_item_ids", |client| {
                let mut request = client.post(url.clone()).json(&Wiql { query: &wiql });
                if let Some(ref t) = top_param {
                    request = request.query(&[("$top", t.as_str())]);
                }
                request
            })
            .await?;

        let mut ids: Vec<WorkItemId> = result
            .work_items
            .into_iter()
            .map(|r| WorkItemId::new(r.id))
            .collect();
        if let Some(t) = top {
            ids.truncate(t);
        }
        Ok(ids)
    }

    async fn fetch_items_as_of(
        &self,
        ids: &[WorkItemId],
        as_of: Option<DateTime<Utc>>,
        fields: &[String],
    ) -> RepositoryResult<Vec<FieldSnapshot>> {
        let mut snapshots = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH_SIZE) {
            debug!(
                "Fetching {} work items as of {:?} ({} fields)",
                chunk.len(),
                as_of,
                fields.len()
            );
            snapshots.extend(self.fetch_batch(chunk, as_of, fields).await?);
        }
        Ok(snapshots)
    }
}

#[async_trait]
impl CatalogRepository for AzureDevOpsRepository {
    async fn list_projects(&self) -> RepositoryResult<Vec<ProjectRef>> {
        let url = self.endpoint(None, &["projects"]);
        let mut projects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let token = continuation.clone();
            let (page, next): (ListResponse<TeamProjectReference>, _) = self
                .execute("list_projects", |client| {
                    let request = client.get(url.clone());
                    match token {
                        Some(ref t) => request.query(&[("continuationToken", t.as_str())]),
                        None => request,
                    }
                })
                .await?;
            projects.extend(page.value.into_iter().map(ProjectRef::from));

            match next {
                Some(t) if Some(&t) != continuation.as_ref() => continuation = Some(t),
                _ => break,
            }
        }

        Ok(projects)
    }

    async fn list_repositories(
        &self,
        project: &ProjectRef,
    ) -> RepositoryResult<Vec<GitRepositoryRef>> {
        let url = self.endpoint(Some(&project.id), &["git", "repositories"]);
        let (list, _): (ListResponse<GitRepository>, _) = self
            .execute("list_repositories", |client| client.get(url.clone()))
            .await?;
        Ok(list.value.into_iter().map(Into::into).collect())
    }

    async fn list_build_definitions(
        &self,
        project: &ProjectRef,
    ) -> RepositoryResult<Vec<BuildDefinitionRef>> {
        let url = self.endpoint(Some(&project.id), &["build", "definitions"]);
        let (list, _): (ListResponse<BuildDefinitionReference>, _) = self
            .execute("list_build_definitions", |client| client.get(url.clone()))
            .await?;
        Ok(list.value.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> AzureDevOpsRepository {
        AzureDevOpsRepository::new(AzureDevOpsConfig::new(
            "https://dev.azure.com/MyOrg/",
            "token",
        ))
        .unwrap()
    }

    #[test]
    fn test_requires_pat() {
        let err = AzureDevOpsRepository::new(AzureDevOpsConfig::new(
            "https://dev.azure.com/MyOrg",
            "  ",
        ))
        .unwrap_err();
        assert!(matches!(err, RepositoryError::ConfigurationError { .. }));
    }

    #[test]
    fn test_rejects_invalid_url() {
        let err = AzureDevOpsRepository::new(AzureDevOpsConfig::new("not a url", "token"))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid organization url"));
    }

    #[test]
    fn test_debug_masks_pat() {
        let config = AzureDevOpsConfig::new("https://dev.azure.com/MyOrg", "secret-token");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn test_endpoint_without_project() {
        let url = repo().endpoint(None, &["wit", "workitems"]);
        assert_eq!(
            url.as_str(),
            "https://dev.azure.com/MyOrg/_apis/wit/workitems?api-version=7.0"
        );
    }

    #[test]
    fn test_endpoint_escapes_project_name() {
        let url = repo().endpoint(Some("My Project"), &["wit", "wiql"]);
        assert_eq!(
            url.as_str(),
            "https://dev.azure.com/MyOrg/My%20Project/_apis/wit/wiql?api-version=7.0"
        );
    }

    #[test]
    fn test_status_error_classification() {
        let auth = status_error(StatusCode::UNAUTHORIZED, "", "op");
        assert!(matches!(auth, RepositoryError::AuthenticationError { .. }));
        assert!(!auth.is_retryable());

        let login = status_error(StatusCode::NON_AUTHORITATIVE_INFORMATION, "<html>", "op");
        assert!(matches!(login, RepositoryError::AuthenticationError { .. }));

        let missing = status_error(
            StatusCode::NOT_FOUND,
            r#"{"message":"TF200016: project does not exist"}"#,
            "op",
        );
        assert!(matches!(missing, RepositoryError::NotFound { .. }));
        assert!(missing.to_string().contains("TF200016"));

        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "", "op").is_retryable());
        assert!(status_error(StatusCode::BAD_GATEWAY, "", "op").is_retryable());
        assert!(!status_error(StatusCode::BAD_REQUEST, "", "op").is_retryable());
    }

    #[tokio::test]
    async fn test_with_retry_retries_transient_errors() {
        let mut config = AzureDevOpsConfig::new("https://dev.azure.com/MyOrg", "token");
        config.max_retries = 2;
        config.retry_delay_ms = 1;
        let repo = AzureDevOpsRepository::new(config).unwrap();

        let mut calls = 0;
        let result: RepositoryResult<u32> = repo
            .with_retry("flaky", || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        Err(RepositoryError::timeout("slow"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(repo.retried_operations(), 1);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_on_permanent_errors() {
        let repo = repo();
        let mut calls = 0;
        let result: RepositoryResult<()> = repo
            .with_retry("broken", || {
                calls += 1;
                async { Err(RepositoryError::request("bad request")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err.context().operation.as_deref(), Some("broken"));
    }
}
