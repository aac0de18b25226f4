//! Page requests and paged results
//!
//! # Example
//!
//! ```rust
//! use acton_repository::query::{Page, PageRequest};
//!
//! let request = PageRequest::new(3, 20);
//! assert_eq!(request.skip(), 40);
//! assert_eq!(request.take(), 20);
//!
//! let page = Page::new(vec!["a", "b"], request, 42);
//! assert_eq!(page.total_pages, 3);
//! assert!(!page.has_next);
//! assert!(page.has_prev);
//! ```

use serde::{Deserialize, Serialize};

use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

/// Default number of items per page
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on items per page unless configured otherwise
pub const MAX_PAGE_SIZE: u32 = 100;

/// A 1-indexed page of a sorted result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    page_number: u32,
    page_size: u32,
}

impl PageRequest {
    /// Create a page request
    ///
    /// Out-of-range values are accepted here and rejected by
    /// [`PageRequest::validate`] when the query is composed.
    #[must_use]
    pub const fn new(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number,
            page_size,
        }
    }

    /// The first page with the given size
    #[must_use]
    pub const fn first(page_size: u32) -> Self {
        Self::new(1, page_size)
    }

    /// The page after this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self::new(self.page_number.saturating_add(1), self.page_size)
    }

    pub const fn page_number(&self) -> u32 {
        self.page_number
    }

    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Entities skipped before this page: `(page_number - 1) * page_size`
    pub const fn skip(&self) -> u64 {
        self.page_number.saturating_sub(1) as u64 * self.page_size as u64
    }

    /// Entities taken for this page
    pub const fn take(&self) -> u64 {
        self.page_size as u64
    }

    /// Reject page 0, size 0, and sizes above `max_page_size`
    pub fn validate(&self, max_page_size: u32) -> RepositoryResult<()> {
        if self.page_number == 0 {
            return Err(RepositoryError::invalid_argument(
                RepositoryOperation::Query,
                "page_number is 1-indexed and must be at least 1",
            ));
        }
        if self.page_size == 0 {
            return Err(RepositoryError::invalid_argument(
                RepositoryOperation::Query,
                "page_size must be at least 1",
            ));
        }
        if self.page_size > max_page_size {
            return Err(RepositoryError::invalid_argument(
                RepositoryOperation::Query,
                format!(
                    "page_size {} exceeds the maximum of {}",
                    self.page_size, max_page_size
                ),
            ));
        }
        Ok(())
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

/// One page of entities plus the metadata needed to walk the rest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Entities on this page
    pub items: Vec<T>,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
    /// Total number of matching items across all pages
    pub total: u64,
    /// Total number of pages
    pub total_pages: u32,
    /// Whether there is a next page
    pub has_next: bool,
    /// Whether there is a previous page
    pub has_prev: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        let per_page = request.page_size().max(1);
        let total_pages = calculate_total_pages(total, per_page);
        Self {
            items,
            page: request.page_number(),
            per_page,
            total,
            total_pages,
            has_next: request.page_number() < total_pages,
            has_prev: request.page_number() > 1,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The request for the following page, if there is one
    pub fn next_request(&self) -> Option<PageRequest> {
        self.has_next
            .then(|| PageRequest::new(self.page, self.per_page).next())
    }

    /// Transform the items while keeping the metadata
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Calculate total pages, rounding up
fn calculate_total_pages(total: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page);
    let pages = total.saturating_add(per_page).saturating_sub(1) / per_page;
    pages.min(u64::from(u32::MAX)) as u32
}
