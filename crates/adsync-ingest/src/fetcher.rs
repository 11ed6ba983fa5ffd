//! Cursor pagination with self-imposed cooldown
//!
//! [`PagedFetcher::fetch`] turns a structural resource into a lazy stream of
//! records. Pages are only requested when the consumer has drained the
//! previous one, and after every `page_size` records consumed the stream
//! pauses for the cooldown before yielding anything else. No retries happen
//! here; a failed request ends the stream with a [`FetchError`].

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::api::{MarketingApi, MetricsQuery, Record};
use crate::catalog::TableKind;
use crate::error::FetchError;
use crate::pacing::{Pacer, PauseReason};
use crate::window::SyncWindow;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_COOLDOWN: Duration = Duration::from_secs(2);
pub const DEFAULT_INSIGHTS_LIMIT: usize = 1000;

/// Pagination state carried between stream steps
struct Cursor {
    buffer: VecDeque<Record>,
    next: Option<String>,
    started: bool,
    consumed: usize,
}

/// Fetches structural resources page by page and metric windows in one go
#[derive(Clone)]
pub struct PagedFetcher {
    api: Arc<dyn MarketingApi>,
    pacer: Arc<dyn Pacer>,
    page_size: usize,
    cooldown: Duration,
}

impl PagedFetcher {
    /// Create a new fetcher with the default page size and cooldown
    pub fn new(api: Arc<dyn MarketingApi>, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            api,
            pacer,
            page_size: DEFAULT_PAGE_SIZE,
            cooldown: DEFAULT_PAGE_COOLDOWN,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Lazily stream every record of `resource` under `account_id`.
    ///
    /// The stream is finite and not restartable. The first request failing
    /// yields [`FetchError::Start`]; any later one yields
    /// [`FetchError::Stream`]. Either way the stream ends after the error.
    pub fn fetch(
        &self,
        account_id: &str,
        resource: &str,
        fields: &[&str],
    ) -> BoxStream<'static, Result<Record, FetchError>> {
        let api = Arc::clone(&self.api);
        let pacer = Arc::clone(&self.pacer);
        let page_size = self.page_size;
        let cooldown = self.cooldown;
        let account = account_id.to_string();
        let resource = resource.to_string();
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();

        let initial = Some(Cursor {
            buffer: VecDeque::new(),
            next: None,
            started: false,
            consumed: 0,
        });

        stream::unfold(initial, move |state| {
            let api = Arc::clone(&api);
            let pacer = Arc::clone(&pacer);
            let account = account.clone();
            let resource = resource.clone();
            let fields = fields.clone();

            async move {
                let mut cursor = state?;

                if cursor.consumed > 0 && cursor.consumed % page_size == 0 {
                    debug!(
                        account = %account,
                        resource = %resource,
                        consumed = cursor.consumed,
                        "Page cooldown"
                    );
                    pacer.pause(cooldown, PauseReason::PageCooldown).await;
                }

                while cursor.buffer.is_empty() {
                    if cursor.started && cursor.next.is_none() {
                        return None;
                    }

                    let field_refs: Vec<&str> = fields.iter().map(String::as_str).collect();
                    let result = api
                        .list_page(&account, &resource, &field_refs, page_size, cursor.next.as_deref())
                        .await;

                    match result {
                        Ok(page) => {
                            cursor.started = true;
                            cursor.next = page.next_cursor;
                            cursor.buffer.extend(page.records);
                        },
                        Err(source) => {
                            let err = if cursor.started {
                                FetchError::Stream {
                                    resource: resource.clone(),
                                    consumed: cursor.consumed,
                                    source,
                                }
                            } else {
                                FetchError::Start {
                                    resource: resource.clone(),
                                    source,
                                }
                            };
                            // Terminate after surfacing the error
                            return Some((Err(err), None));
                        },
                    }
                }

                let record = cursor.buffer.pop_front()?;
                cursor.consumed += 1;
                Some((Ok(record), Some(cursor)))
            }
        })
        .boxed()
    }

    /// Fetch every row of a metric table for `window`
    pub async fn fetch_metrics(
        &self,
        account_id: &str,
        table: TableKind,
        window: SyncWindow,
        breakdowns: &[&str],
        limit: usize,
    ) -> Result<Vec<Record>, FetchError> {
        let level = table.level().unwrap_or_default();
        let fields = table.fields();
        let query = MetricsQuery {
            fields: &fields,
            window,
            level,
            breakdowns,
            limit,
        };

        self.api
            .query_metrics(account_id, &query)
            .await
            .map_err(|source| FetchError::Metrics {
                table: table.table_name().to_string(),
                source,
            })
    }
}
