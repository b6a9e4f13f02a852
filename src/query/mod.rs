//! Paginated query cursor and its retry wrapper.

mod cursor;
mod retry_fetch;

pub use cursor::{Page, PageFetcher, QueryCursor, QuerySource};
pub use retry_fetch::{CONTINUATION_HEADER, MAX_ITEM_COUNT_HEADER};
