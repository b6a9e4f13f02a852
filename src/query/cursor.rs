//! Paginated, continuation-token query cursor. Independent of the session
//! handler; not thread-safe — callers serialize their own access.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::query::retry_fetch;
use crate::retry::RetryEngine;

/// One page of query results plus the token to fetch the next one.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation_token: Option<String>,
}

/// The original query, carried opaquely so a fetcher can re-issue it for
/// each page (query text, or a job-type/status filter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    Text(String),
    JobFilter { job_type: String, status: String },
}

/// Fetches one page at a time. Implementations own the HTTP request shaping
/// and the wire continuation protocol headers (`x-ms-continuation`,
/// `x-ms-max-item-count`) — both out of scope for this crate.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(&self, continuation: Option<&str>, page_size: Option<u32>) -> Result<Page<T>, SessionError>;
}

/// Iterates a query's results one item at a time, fetching additional pages
/// through a retry-wrapped [`PageFetcher`] as needed.
pub struct QueryCursor<T> {
    #[allow(dead_code)]
    query: QuerySource,
    page_size: Option<u32>,
    continuation: Option<String>,
    started: bool,
    exhausted: bool,
    current_page: VecDeque<T>,
    current: Option<T>,
    fetcher: Arc<dyn PageFetcher<T>>,
    retry_engine: RetryEngine,
}

impl<T: Clone + Send + Sync + 'static> QueryCursor<T> {
    pub fn new(
        query: QuerySource,
        page_size: Option<u32>,
        fetcher: Arc<dyn PageFetcher<T>>,
        retry_engine: RetryEngine,
    ) -> Self {
        Self {
            query,
            page_size,
            continuation: None,
            started: false,
            exhausted: false,
            current_page: VecDeque::new(),
            current: None,
            fetcher,
            retry_engine,
        }
    }

    /// Seeds the cursor with a page the caller already fetched, so the first
    /// `move_next` does not re-fetch it.
    pub fn with_initial_page(mut self, page: Page<T>) -> Self {
        self.started = true;
        self.continuation = page.continuation_token;
        self.current_page = page.items.into();
        self
    }

    /// Advances to the next item. Terminal once it returns `false`: calling
    /// it again returns `false` without issuing any further fetch.
    pub async fn move_next(&mut self, cancel: CancellationToken) -> Result<bool, SessionError> {
        if self.exhausted {
            return Ok(false);
        }

        if let Some(item) = self.current_page.pop_front() {
            self.current = Some(item);
            return Ok(true);
        }

        if self.started && self.continuation.is_none() {
            self.exhausted = true;
            return Ok(false);
        }

        let page = self.fetch_next_page(cancel).await?;
        self.started = true;
        self.continuation = page.continuation_token;
        self.current_page = page.items.into();

        if let Some(item) = self.current_page.pop_front() {
            self.current = Some(item);
            Ok(true)
        } else {
            self.exhausted = true;
            Ok(false)
        }
    }

    async fn fetch_next_page(&self, cancel: CancellationToken) -> Result<Page<T>, SessionError> {
        retry_fetch::fetch_with_retry(
            &self.retry_engine,
            &self.fetcher,
            self.continuation.clone(),
            self.page_size,
            cancel,
        )
        .await
    }

    /// Fetches and returns whole pages lazily, one call at a time, until the
    /// continuation token runs out. A thin wrapper over the same page-fetch
    /// machinery `move_next` uses.
    pub async fn next_page(&mut self, cancel: CancellationToken) -> Result<Option<Page<T>>, SessionError> {
        if self.exhausted {
            return Ok(None);
        }
        if self.started && self.continuation.is_none() && self.current_page.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        let page = self.fetch_next_page(cancel).await?;
        self.started = true;
        self.continuation = page.continuation_token.clone();
        if page.items.is_empty() && self.continuation.is_none() {
            self.exhausted = true;
        }
        Ok(Some(page))
    }

    /// Last item returned by `move_next`. `None` before the first successful
    /// call (spec calls this "undefined"; returning `None` is the idiomatic
    /// Rust rendering rather than a dangling reference or panic).
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    pub fn current_page(&self) -> impl Iterator<Item = &T> {
        self.current_page.iter()
    }
}
