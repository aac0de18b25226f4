//! Read options shared by every façade query verb

use std::fmt;

use crate::entity::Tracking;

use super::filter::Filter;
use super::pagination::PageRequest;
use super::sort::{OrderDirection, SortKey, SortSpec};

/// Tracking mode, filter, ordering and page for one read
///
/// Every combination the façade supports is a value of this type, so one
/// `query` method covers tracked/untracked × filtered/unfiltered ×
/// ordered/unordered × paged/unpaged.
///
/// # Example
///
/// ```rust
/// use acton_repository::query::{OrderDirection, QueryOptions};
///
/// let options = QueryOptions::<(String, u64)>::new()
///     .untracked()
///     .filter(|c| c.1 > 1_000)
///     .sort_by(|c| c.0.clone(), OrderDirection::Ascending)
///     .sort_by(|c| c.1, OrderDirection::Descending)
///     .page(1, 10);
///
/// assert!(options.has_filter());
/// assert_eq!(options.sort_spec().map(|s| s.len()), Some(2));
/// ```
pub struct QueryOptions<T> {
    pub(crate) tracking: Tracking,
    pub(crate) filter: Option<Filter<T>>,
    pub(crate) sort: Option<SortSpec<T>>,
    pub(crate) page: Option<PageRequest>,
}

impl<T: 'static> QueryOptions<T> {
    /// Tracked, unfiltered, unordered, unpaged
    pub fn new() -> Self {
        Self {
            tracking: Tracking::Tracked,
            filter: None,
            sort: None,
            page: None,
        }
    }

    #[must_use]
    pub fn tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = tracking;
        self
    }

    /// Return read-only copies that the unit of work does not remember
    #[must_use]
    pub fn untracked(self) -> Self {
        self.tracking(Tracking::Untracked)
    }

    /// Keep only entities matching `predicate`
    ///
    /// Calling this twice narrows with both predicates.
    #[must_use]
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.with_filter(Filter::new(predicate))
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter<T>) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Replace the ordering with a complete specification
    ///
    /// An empty specification is kept as-is so the composer can reject it.
    #[must_use]
    pub fn order_by(mut self, spec: SortSpec<T>) -> Self {
        self.sort = Some(spec);
        self
    }

    /// Append one sort key; the first call sets the primary order
    #[must_use]
    pub fn sort_by<K, F>(mut self, selector: F, direction: OrderDirection) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
        K: Ord,
    {
        self.sort
            .get_or_insert_with(SortSpec::new)
            .push(SortKey::new(selector, direction));
        self
    }

    /// Slice the ordered result to one page
    #[must_use]
    pub fn page(self, page_number: u32, page_size: u32) -> Self {
        self.with_page(PageRequest::new(page_number, page_size))
    }

    #[must_use]
    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }
}

impl<T> QueryOptions<T> {
    pub fn tracking_mode(&self) -> Tracking {
        self.tracking
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn filter_ref(&self) -> Option<&Filter<T>> {
        self.filter.as_ref()
    }

    pub fn sort_spec(&self) -> Option<&SortSpec<T>> {
        self.sort.as_ref()
    }

    pub fn page_request(&self) -> Option<PageRequest> {
        self.page
    }
}

impl<T: 'static> Default for QueryOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for QueryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            tracking: self.tracking,
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            page: self.page,
        }
    }
}

impl<T> fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("tracking", &self.tracking)
            .field("filtered", &self.filter.is_some())
            .field("sort", &self.sort)
            .field("page", &self.page)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options: QueryOptions<u32> = QueryOptions::default();
        assert_eq!(options.tracking_mode(), Tracking::Tracked);
        assert!(!options.has_filter());
        assert!(options.sort_spec().is_none());
        assert!(options.page_request().is_none());
    }

    #[test]
    fn test_repeated_filters_narrow() {
        let options = QueryOptions::<u32>::new()
            .filter(|n| *n > 10)
            .filter(|n| *n < 20);
        let filter = options.filter_ref().expect("filter set");
        assert!(filter.matches(&15));
        assert!(!filter.matches(&5));
        assert!(!filter.matches(&25));
    }

    #[test]
    fn test_sort_by_appends() {
        let options = QueryOptions::<(u8, u8)>::new()
            .sort_by(|p| p.0, OrderDirection::Ascending)
            .sort_by(|p| p.1, OrderDirection::Descending);
        let spec = options.sort_spec().expect("sort set");
        assert_eq!(spec.len(), 2);
        assert_eq!(spec.keys()[1].direction(), OrderDirection::Descending);
    }

    #[test]
    fn test_order_by_keeps_empty_spec() {
        let options = QueryOptions::<u8>::new().order_by(SortSpec::new());
        assert!(options.sort_spec().is_some_and(|s| s.is_empty()));
    }

    #[test]
    fn test_untracked_and_page() {
        let options = QueryOptions::<u8>::new().untracked().page(2, 5);
        assert_eq!(options.tracking_mode(), Tracking::Untracked);
        assert_eq!(options.page_request(), Some(PageRequest::new(2, 5)));
    }
}
