//! Multi-key sort specifications
//!
//! A [`SortSpec`] is an ordered list of [`SortKey`]s. The first key is the
//! primary order; every later key only breaks ties left by the keys before
//! it. The whole list folds into one comparator, so the storage collaborator
//! sorts once with a stable sort.
//!
//! # Example
//!
//! ```rust
//! use acton_repository::query::{OrderDirection, SortSpec};
//!
//! let spec = SortSpec::by(|c: &(char, u32)| c.0, OrderDirection::Ascending)
//!     .then_by(|c| c.1, OrderDirection::Descending);
//!
//! let mut rows = vec![('B', 10), ('A', 50), ('A', 100)];
//! rows.sort_by(spec.comparator());
//! assert_eq!(rows, vec![('A', 100), ('A', 50), ('B', 10)]);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Direction for ordering results
///
/// # Example
///
/// ```rust
/// use acton_repository::query::OrderDirection;
///
/// assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
/// assert_eq!(OrderDirection::from_descending(true), OrderDirection::Descending);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl OrderDirection {
    /// Map a `descending` flag onto a direction
    pub const fn from_descending(descending: bool) -> Self {
        if descending {
            Self::Descending
        } else {
            Self::Ascending
        }
    }

    /// Apply this direction to an ascending comparison result
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// One level of a multi-key sort: a key extractor and a direction
pub struct SortKey<T> {
    compare: Comparator<T>,
    direction: OrderDirection,
}

impl<T> SortKey<T> {
    /// Build a sort key from a key selector
    pub fn new<K, F>(selector: F, direction: OrderDirection) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
        K: Ord,
    {
        Self {
            compare: Arc::new(move |a, b| selector(a).cmp(&selector(b))),
            direction,
        }
    }

    /// Ascending key
    pub fn ascending<K, F>(selector: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
        K: Ord,
    {
        Self::new(selector, OrderDirection::Ascending)
    }

    /// Descending key
    pub fn descending<K, F>(selector: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
        K: Ord,
    {
        Self::new(selector, OrderDirection::Descending)
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    /// Compare two entities on this key alone, honouring the direction
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.direction.apply((self.compare)(a, b))
    }
}

impl<T> Clone for SortKey<T> {
    fn clone(&self) -> Self {
        Self {
            compare: Arc::clone(&self.compare),
            direction: self.direction,
        }
    }
}

impl<T> fmt::Debug for SortKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortKey")
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

/// Ordered list of sort keys; the first is primary, the rest break ties
pub struct SortSpec<T> {
    keys: Vec<SortKey<T>>,
}

impl<T> SortSpec<T> {
    /// An empty specification
    ///
    /// Passing an empty specification where ordering is required is rejected
    /// by the composer.
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Start a specification with its primary key
    pub fn by<K, F>(selector: F, direction: OrderDirection) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
        K: Ord,
    {
        Self {
            keys: vec![SortKey::new(selector, direction)],
        }
    }

    /// Append a tie-breaking key
    #[must_use]
    pub fn then_by<K, F>(mut self, selector: F, direction: OrderDirection) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
        K: Ord,
    {
        self.keys.push(SortKey::new(selector, direction));
        self
    }

    /// Append an already-built key
    pub fn push(&mut self, key: SortKey<T>) {
        self.keys.push(key);
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[SortKey<T>] {
        &self.keys
    }

    /// Fold every key into a single comparator
    ///
    /// Later keys are consulted only while all earlier keys compare equal.
    pub fn comparator(&self) -> impl Fn(&T, &T) -> Ordering + '_ {
        move |a, b| {
            self.keys
                .iter()
                .fold(Ordering::Equal, |acc, key| acc.then_with(|| key.compare(a, b)))
        }
    }
}

impl<T> Default for SortSpec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SortSpec<T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl<T> fmt::Debug for SortSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys.iter()).finish()
    }
}

impl<T> FromIterator<SortKey<T>> for SortSpec<T> {
    fn from_iter<I: IntoIterator<Item = SortKey<T>>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}
