//! Applies a retry policy and engine to each page fetch, plus the
//! wire-level HTTP status mapping used by query/job endpoints.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cancel::LinkedCancel;
use crate::error::SessionError;
use crate::query::cursor::{Page, PageFetcher};
use crate::retry::RetryEngine;

/// Request header carrying the continuation token for the next page.
pub const CONTINUATION_HEADER: &str = "x-ms-continuation";
/// Request header suggesting the page size to the server.
pub const MAX_ITEM_COUNT_HEADER: &str = "x-ms-max-item-count";

/// Runs one page fetch through the given retry engine. The same policy
/// instance used by the session handler may be reused here, or a dedicated
/// query-retry policy can be injected — both are dependency-injected, never
/// constructed by this crate.
pub(crate) async fn fetch_with_retry<T: Send + Sync + 'static>(
    engine: &RetryEngine,
    fetcher: &Arc<dyn PageFetcher<T>>,
    continuation: Option<String>,
    page_size: Option<u32>,
    cancel: CancellationToken,
) -> Result<Page<T>, SessionError> {
    let linked = LinkedCancel::user_only(cancel);
    let fetcher = fetcher.clone();
    engine
        .run_with_retry(
            move || {
                let fetcher = fetcher.clone();
                let continuation = continuation.clone();
                async move { fetcher.fetch_page(continuation.as_deref(), page_size).await }
            },
            &linked,
        )
        .await
}
