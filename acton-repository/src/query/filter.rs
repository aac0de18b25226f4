//! Entity filter predicates

use std::fmt;
use std::sync::Arc;

/// A shareable `T -> bool` predicate
///
/// Filters are applied before sorting and paging. They are cheap to clone,
/// so one filter can drive both a page query and its total count.
///
/// # Example
///
/// ```rust
/// use acton_repository::query::Filter;
///
/// let big = Filter::new(|n: &u32| *n > 100);
/// let even = Filter::new(|n: &u32| n % 2 == 0);
/// let big_and_even = big.and(even);
///
/// assert!(big_and_even.matches(&200));
/// assert!(!big_and_even.matches(&201));
/// ```
pub struct Filter<T> {
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: 'static> Filter<T> {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Both filters must match
    #[must_use]
    pub fn and(self, other: Filter<T>) -> Self {
        Self::new(move |entity| self.matches(entity) && other.matches(entity))
    }

    /// Either filter may match
    #[must_use]
    pub fn or(self, other: Filter<T>) -> Self {
        Self::new(move |entity| self.matches(entity) || other.matches(entity))
    }

    /// Invert the filter
    #[must_use]
    pub fn negate(self) -> Self {
        Self::new(move |entity| !self.matches(entity))
    }
}

impl<T> Filter<T> {
    pub fn matches(&self, entity: &T) -> bool {
        (self.predicate)(entity)
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        let filter = Filter::new(|s: &String| s.starts_with('a'));
        assert!(filter.matches(&"apple".to_string()));
        assert!(!filter.matches(&"banana".to_string()));
    }

    #[test]
    fn test_combinators() {
        let small = Filter::new(|n: &i32| *n < 10);
        let negative = Filter::new(|n: &i32| *n < 0);

        let small_non_negative = small.clone().and(negative.clone().negate());
        assert!(small_non_negative.matches(&5));
        assert!(!small_non_negative.matches(&-1));
        assert!(!small_non_negative.matches(&11));

        let large_or_negative = small.negate().or(negative);
        assert!(large_or_negative.matches(&-3));
        assert!(large_or_negative.matches(&50));
        assert!(!large_or_negative.matches(&3));
    }

    #[test]
    fn test_clone_shares_predicate() {
        let filter = Filter::new(|n: &u8| *n == 1);
        let copy = filter.clone();
        assert!(Arc::ptr_eq(&filter.predicate, &copy.predicate));
    }
}
