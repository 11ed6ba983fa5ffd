//! Marketing API collaborator
//!
//! The engine talks to the upstream only through [`MarketingApi`]. The live
//! implementation is [`graph::GraphApiClient`]; tests script their own.

pub mod graph;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::window::SyncWindow;

pub use graph::{GraphApiClient, GraphApiConfig};

/// A flat mapping of field names to scalar or nested values
pub type Record = serde_json::Map<String, serde_json::Value>;

/// One page of a cursor-paginated structural resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<Record>,
    /// Cursor for the next page; `None` on the last page
    pub next_cursor: Option<String>,
}

/// Parameters of a windowed metrics query
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsQuery<'a> {
    pub fields: &'a [&'a str],
    pub window: SyncWindow,
    /// Aggregation level: `ad`, `adset` or `campaign`
    pub level: &'a str,
    pub breakdowns: &'a [&'a str],
    /// Page size hint for the upstream
    pub limit: usize,
}

/// Remote, rate-limited, paginated marketing API
#[async_trait]
pub trait MarketingApi: Send + Sync {
    /// Fetch one page of `resource` (e.g. `campaigns`) under `account_id`.
    ///
    /// `cursor` is `None` for the first page.
    async fn list_page(
        &self,
        account_id: &str,
        resource: &str,
        fields: &[&str],
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<Page, ApiError>;

    /// Fetch every metric row for `account_id` within `query.window`
    async fn query_metrics(
        &self,
        account_id: &str,
        query: &MetricsQuery<'_>,
    ) -> Result<Vec<Record>, ApiError>;
}
