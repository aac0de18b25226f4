//! Composable reads: filters, multi-key ordering and pagination
//!
//! - [`Filter`]: a shareable predicate
//! - [`SortSpec`] / [`SortKey`] / [`OrderDirection`]: primary-then-tie-breaker ordering
//! - [`PageRequest`] / [`Page`]: 1-indexed page slices and paged results
//! - [`QueryOptions`]: everything one read can ask for
//! - [`QueryComposer`] / [`Query`]: validation and the composed, lazy query

mod composer;
mod filter;
mod options;
mod pagination;
mod sort;

pub use composer::{Query, QueryComposer};
pub use filter::Filter;
pub use options::QueryOptions;
pub use pagination::{Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use sort::{OrderDirection, SortKey, SortSpec};
