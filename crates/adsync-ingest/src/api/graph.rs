//! Graph API client
//!
//! Live [`MarketingApi`] over HTTPS. Structural edges are fetched one page at
//! a time so the fetcher can pace them; insight queries follow their own
//! cursors until exhausted.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{MarketingApi, MetricsQuery, Page, Record};
use crate::error::ApiError;

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v19.0";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

const USER_AGENT: &str = concat!("adsync/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`GraphApiClient`]
#[derive(Clone)]
pub struct GraphApiConfig {
    pub base_url: String,
    pub api_version: String,
    pub access_token: String,
    pub timeout_secs: u64,
}

impl GraphApiConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            access_token: access_token.into(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl std::fmt::Debug for GraphApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphApiConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("access_token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Vec<Record>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    cursors: Option<Cursors>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cursors {
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl Envelope {
    /// The `after` cursor, only when the upstream says another page exists
    fn next_cursor(&self) -> Option<String> {
        let paging = self.paging.as_ref()?;
        paging.next.as_ref()?;
        paging.cursors.as_ref()?.after.clone()
    }
}

// ============================================================================
// Client
// ============================================================================

/// reqwest-backed Graph API client
pub struct GraphApiClient {
    client: Client,
    config: GraphApiConfig,
}

impl GraphApiClient {
    /// Create a new client from the API settings
    pub fn new(config: GraphApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, config })
    }

    fn edge_url(&self, account_id: &str, edge: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            account_id,
            edge
        )
    }

    async fn get_page(&self, url: &str, params: &[(&str, String)]) -> Result<Envelope, ApiError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("access_token", self.config.access_token.as_str())])
            .send()
            .await?;

        let response = check_status(response).await?;
        let envelope: Envelope = response.json().await?;
        Ok(envelope)
    }
}

/// Turn a non-2xx response into an [`ApiError`] carrying the upstream message
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => format!("HTTP {}: {}", status, body.trim()),
    };
    warn!(status = %status, error = %message, "Graph API request failed");
    Err(ApiError::new(message))
}

#[async_trait]
impl MarketingApi for GraphApiClient {
    async fn list_page(
        &self,
        account_id: &str,
        resource: &str,
        fields: &[&str],
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<Page, ApiError> {
        let url = self.edge_url(account_id, resource);
        let mut params = vec![("fields", fields.join(",")), ("limit", page_size.to_string())];
        if let Some(after) = cursor {
            params.push(("after", after.to_string()));
        }

        let envelope = self.get_page(&url, &params).await?;
        let next_cursor = envelope.next_cursor();
        debug!(
            account = %account_id,
            resource = %resource,
            records = envelope.data.len(),
            has_next = next_cursor.is_some(),
            "Fetched page"
        );

        Ok(Page {
            records: envelope.data,
            next_cursor,
        })
    }

    async fn query_metrics(
        &self,
        account_id: &str,
        query: &MetricsQuery<'_>,
    ) -> Result<Vec<Record>, ApiError> {
        let url = self.edge_url(account_id, "insights");
        let time_range = serde_json::json!({
            "since": query.window.since.format("%Y-%m-%d").to_string(),
            "until": query.window.until.format("%Y-%m-%d").to_string(),
        });
        let base_params = vec![
            ("fields", query.fields.join(",")),
            ("level", query.level.to_string()),
            ("time_range", time_range.to_string()),
            ("time_increment", "1".to_string()),
            ("breakdowns", query.breakdowns.join(",")),
            ("limit", query.limit.to_string()),
        ];

        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut params = base_params.clone();
            if let Some(after) = cursor.take() {
                params.push(("after", after));
            }
            let envelope = self.get_page(&url, &params).await?;
            cursor = envelope.next_cursor();
            rows.extend(envelope.data);
            if cursor.is_none() {
                break;
            }
        }

        debug!(
            account = %account_id,
            level = %query.level,
            window = %query.window,
            rows = rows.len(),
            "Fetched insights"
        );
        Ok(rows)
    }
}

/// Extract a string field from a record, if present
pub fn field_str<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    record.get(name).and_then(Value::as_str)
}
