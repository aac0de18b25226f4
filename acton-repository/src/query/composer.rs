//! Query composition: filter → multi-key sort → page
//!
//! [`QueryComposer`] validates a [`QueryOptions`] and produces a [`Query`],
//! a description of the read that nothing has executed yet. The storage
//! session owning the base sequence runs it with [`Query::execute`].
//!
//! # Example
//!
//! ```rust
//! use acton_repository::query::{OrderDirection, QueryComposer, QueryOptions};
//! use acton_repository::repository::RepositoryOperation;
//!
//! let composer = QueryComposer::default();
//! let options = QueryOptions::<u32>::new()
//!     .filter(|n| n % 2 == 1)
//!     .sort_by(|n| *n, OrderDirection::Descending)
//!     .page(1, 2);
//!
//! let query = composer.compose(&options, RepositoryOperation::Query).unwrap();
//! assert_eq!(query.execute(1..=9), vec![9, 7]);
//! ```

use std::fmt;

use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

use super::filter::Filter;
use super::options::QueryOptions;
use super::pagination::{PageRequest, MAX_PAGE_SIZE};
use super::sort::SortSpec;

/// A composed, not-yet-executed read
pub struct Query<T> {
    filter: Option<Filter<T>>,
    sort: Option<SortSpec<T>>,
    page: Option<PageRequest>,
}

impl<T> Query<T> {
    /// A query returning the base sequence unchanged
    pub fn all() -> Self {
        Self {
            filter: None,
            sort: None,
            page: None,
        }
    }

    pub fn filter(&self) -> Option<&Filter<T>> {
        self.filter.as_ref()
    }

    pub fn sort(&self) -> Option<&SortSpec<T>> {
        self.sort.as_ref()
    }

    pub fn page(&self) -> Option<PageRequest> {
        self.page
    }

    pub fn is_ordered(&self) -> bool {
        self.sort.is_some()
    }

    /// Whether an entity passes the filter stage
    pub fn matches(&self, entity: &T) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(entity))
    }

    /// The same query without its page slice, for totals
    pub fn unpaged(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            page: None,
        }
    }

    /// Run the query over a base sequence
    ///
    /// Sorting is stable, so entities equal on every key keep their base
    /// order and repeated runs over the same base yield the same order.
    pub fn execute<I>(&self, base: I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        let mut rows: Vec<T> = base.into_iter().filter(|e| self.matches(e)).collect();

        if let Some(spec) = &self.sort {
            rows.sort_by(spec.comparator());
        }

        match self.page {
            Some(page) => {
                let skip = usize::try_from(page.skip()).unwrap_or(usize::MAX);
                let take = usize::try_from(page.take()).unwrap_or(usize::MAX);
                rows.into_iter().skip(skip).take(take).collect()
            }
            None => rows,
        }
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            page: self.page,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filtered", &self.filter.is_some())
            .field("sort", &self.sort)
            .field("page", &self.page)
            .finish()
    }
}

/// Validates read options and builds [`Query`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryComposer {
    max_page_size: u32,
}

impl QueryComposer {
    pub const fn new(max_page_size: u32) -> Self {
        Self { max_page_size }
    }

    pub const fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// Compose a read whose filter is optional
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if ordering was requested with an empty sort list,
    /// or if the page request is out of range.
    pub fn compose<T>(
        &self,
        options: &QueryOptions<T>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Query<T>> {
        if let Some(spec) = &options.sort {
            if spec.is_empty() {
                return Err(RepositoryError::invalid_argument(
                    operation,
                    "ordering requested with an empty sort specification",
                ));
            }
        }

        if let Some(page) = &options.page {
            page.validate(self.max_page_size)
                .map_err(|e| e.with_operation(operation))?;
        }

        Ok(Query {
            filter: options.filter.clone(),
            sort: options.sort.clone(),
            page: options.page,
        })
    }

    /// Compose a read that must carry a filter
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when no filter is set, plus everything
    /// [`QueryComposer::compose`] rejects.
    pub fn compose_filtered<T>(
        &self,
        options: &QueryOptions<T>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Query<T>> {
        if options.filter.is_none() {
            return Err(RepositoryError::invalid_argument(
                operation,
                "a filter predicate is required",
            ));
        }
        self.compose(options, operation)
    }
}

impl Default for QueryComposer {
    fn default() -> Self {
        Self::new(MAX_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::OrderDirection;
    use crate::repository::RepositoryErrorKind;

    #[derive(Debug, Clone, PartialEq)]
    struct City {
        name: &'static str,
        population: u64,
    }

    fn city(name: &'static str, population: u64) -> City {
        City { name, population }
    }

    fn by_name_then_population() -> QueryOptions<City> {
        QueryOptions::new()
            .sort_by(|c: &City| c.name, OrderDirection::Ascending)
            .sort_by(|c| c.population, OrderDirection::Descending)
    }

    #[test]
    fn test_name_asc_population_desc() {
        let query = QueryComposer::default()
            .compose(&by_name_then_population(), RepositoryOperation::Query)
            .unwrap();

        let result = query.execute(vec![city("A", 50), city("B", 10), city("A", 100)]);
        assert_eq!(result, vec![city("A", 100), city("A", 50), city("B", 10)]);
    }

    #[test]
    fn test_empty_sort_is_invalid() {
        let options = QueryOptions::<City>::new().order_by(SortSpec::new());
        let err = QueryComposer::default()
            .compose(&options, RepositoryOperation::Query)
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidArgument);
        assert_eq!(err.operation, RepositoryOperation::Query);
    }

    #[test]
    fn test_filter_required() {
        let err = QueryComposer::default()
            .compose_filtered(&QueryOptions::<City>::new(), RepositoryOperation::First)
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidArgument);
        assert_eq!(err.operation, RepositoryOperation::First);
    }

    #[test]
    fn test_page_two_of_five() {
        let options = QueryOptions::<u32>::new()
            .sort_by(|n| *n, OrderDirection::Ascending)
            .page(2, 2);
        let query = QueryComposer::default()
            .compose(&options, RepositoryOperation::Query)
            .unwrap();

        // Positions 2 and 3 of the sorted sequence 10, 20, 30, 40, 50
        assert_eq!(query.execute(vec![50, 10, 40, 20, 30]), vec![30, 40]);
    }

    #[test]
    fn test_page_validation_reports_operation() {
        let options = QueryOptions::<u32>::new().page(0, 10);
        let err = QueryComposer::default()
            .compose(&options, RepositoryOperation::First)
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidArgument);
        assert_eq!(err.operation, RepositoryOperation::First);

        let options = QueryOptions::<u32>::new().page(1, 11);
        assert!(QueryComposer::new(10)
            .compose(&options, RepositoryOperation::Query)
            .is_err());
    }

    #[test]
    fn test_filter_runs_before_paging() {
        let options = QueryOptions::<u32>::new()
            .filter(|n| n % 2 == 0)
            .sort_by(|n| *n, OrderDirection::Ascending)
            .page(1, 3);
        let query = QueryComposer::default()
            .compose(&options, RepositoryOperation::Query)
            .unwrap();
        assert_eq!(query.execute(1..=20), vec![2, 4, 6]);
    }

    #[test]
    fn test_execution_is_deterministic() {
        let options = QueryOptions::<City>::new()
            .sort_by(|c: &City| c.population / 100, OrderDirection::Descending);
        let query = QueryComposer::default()
            .compose(&options, RepositoryOperation::Query)
            .unwrap();

        let base = vec![
            city("a", 120),
            city("b", 150),
            city("c", 300),
            city("d", 110),
            city("e", 310),
        ];
        let first = query.execute(base.clone());
        let second = query.execute(base);
        assert_eq!(first, second);
        // Stable: ties keep base order
        let names: Vec<&str> = first.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["c", "e", "a", "b", "d"]);
    }

    #[test]
    fn test_pages_partition_the_result() {
        let options = QueryOptions::<u32>::new()
            .filter(|n| n % 3 != 0)
            .sort_by(|n| std::cmp::Reverse(*n), OrderDirection::Ascending);
        let composer = QueryComposer::default();
        let full = composer
            .compose(&options, RepositoryOperation::Query)
            .unwrap()
            .execute(1..=50);

        for page_size in 1..=8_u32 {
            let pages = (full.len() as u32).div_ceil(page_size);
            let mut stitched = Vec::new();
            for page_number in 1..=pages {
                let paged = options.clone().page(page_number, page_size);
                stitched.extend(
                    composer
                        .compose(&paged, RepositoryOperation::Query)
                        .unwrap()
                        .execute(1..=50),
                );
            }
            assert_eq!(stitched, full, "page_size {page_size}");
        }
    }

    #[test]
    fn test_unpaged_drops_only_the_page() {
        let options = QueryOptions::<u32>::new()
            .filter(|n| *n > 2)
            .page(1, 1);
        let query = QueryComposer::default()
            .compose(&options, RepositoryOperation::Query)
            .unwrap();
        let unpaged = query.unpaged();
        assert!(unpaged.page().is_none());
        assert!(unpaged.filter().is_some());
        assert_eq!(unpaged.execute(1..=5), vec![3, 4, 5]);
    }
}
