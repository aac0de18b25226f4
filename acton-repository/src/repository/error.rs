//! Repository error types
//!
//! Every failure surfaced by the façade or a storage session is a
//! [`RepositoryError`]: the verb that was running, a coarse
//! [`RepositoryErrorKind`] callers can branch on, and optional entity context.
//!
//! # Example
//!
//! ```rust
//! use acton_repository::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::invalid_argument(RepositoryOperation::Query, "sort list is empty");
//! assert!(matches!(error.kind, RepositoryErrorKind::InvalidArgument));
//! assert!(!error.is_retriable());
//! ```

use std::fmt;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Composing or executing a multi-entity query
    Query,
    /// Looking up a single entity by its key
    FindById,
    /// Taking the first entity of a query
    First,
    /// Counting entities matching a filter
    Count,
    /// Checking whether any entity matches a filter
    Any,
    /// Marking entities for insertion
    Add,
    /// Marking entities for modification
    Update,
    /// Marking entities for deletion
    Remove,
    /// Flushing pending marks to storage
    Save,
    /// Opening a transaction
    BeginTransaction,
    /// Committing a transaction
    Commit,
    /// Rolling back a transaction
    Rollback,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::FindById => write!(f, "find_by_id"),
            Self::First => write!(f, "first"),
            Self::Count => write!(f, "count"),
            Self::Any => write!(f, "any"),
            Self::Add => write!(f, "add"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
            Self::Save => write!(f, "save"),
            Self::BeginTransaction => write!(f, "begin_transaction"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// A required filter or sort specification was missing or empty,
    /// or a page request was out of range
    InvalidArgument,
    /// Entity was not found where one was required
    NotFound,
    /// The caller's cancellation token fired mid-operation
    Cancelled,
    /// A pending update or delete matched no stored row
    ConcurrencyConflict,
    /// Storage constraint violation (duplicate key, foreign key, check)
    ConstraintViolation,
    /// Transaction begun while another is active
    TransactionState,
    /// A result did not fit the requested integer width
    Overflow,
    /// Failed to connect to storage
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Underlying database error
    DatabaseError,
    /// Serialization or deserialization error
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid_argument"),
            Self::NotFound => write!(f, "not_found"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ConcurrencyConflict => write!(f, "concurrency_conflict"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::TransactionState => write!(f, "transaction_state"),
            Self::Overflow => write!(f, "overflow"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use acton_repository::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::concurrency_conflict(RepositoryOperation::Save, "no row matched")
///     .with_entity("cities", "42");
/// assert_eq!(
///     error.to_string(),
///     "Repository concurrency_conflict error during save: no row matched [cities: 42]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The collection of the entity involved (e.g., "users")
    pub entity_type: Option<String>,
    /// The storage key of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::InvalidArgument, message)
    }

    /// Create a cancellation error for the given operation
    pub fn cancelled(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::Cancelled,
            "Operation cancelled by caller",
        )
    }

    /// Create a concurrency conflict error
    pub fn concurrency_conflict(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::ConcurrencyConflict, message)
    }

    /// Create a constraint violation error
    pub fn constraint_violation(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::ConstraintViolation, message)
    }

    /// Create a transaction state error
    pub fn transaction_state(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::TransactionState, message)
    }

    /// Create an overflow error
    pub fn overflow(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Overflow, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Query,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a database error
    pub fn database_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DatabaseError, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    ///
    /// Storage sessions do not know which façade verb called them; the façade
    /// re-tags their errors with this.
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    ///
    /// A concurrency conflict is retriable after the caller reloads the entity.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed
                | RepositoryErrorKind::Timeout
                | RepositoryErrorKind::ConcurrencyConflict
        )
    }

    /// Whether the error was raised because the caller cancelled
    pub fn is_cancelled(&self) -> bool {
        self.kind == RepositoryErrorKind::Cancelled
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(ref entity_type), Some(ref entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(RepositoryOperation::Query, err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error;
        match err {
            Error::RowNotFound => Self::new(
                RepositoryOperation::FindById,
                RepositoryErrorKind::NotFound,
                "Row not found",
            ),
            Error::Database(ref db_err)
                if db_err.is_unique_violation()
                    || db_err.message().contains("UNIQUE constraint failed") =>
            {
                Self::constraint_violation(RepositoryOperation::Save, db_err.message())
            }
            Error::Database(ref db_err)
                if db_err.is_foreign_key_violation() || db_err.is_check_violation() =>
            {
                Self::constraint_violation(RepositoryOperation::Save, db_err.message())
            }
            Error::PoolTimedOut => Self::timeout(
                RepositoryOperation::Query,
                "Timed out acquiring a pooled connection",
            ),
            Error::Io(_) | Error::Tls(_) | Error::PoolClosed => {
                Self::connection_failed(err.to_string())
            }
            Error::ColumnDecode { .. } | Error::Decode(_) => {
                Self::serialization_error(RepositoryOperation::Query, err.to_string())
            }
            _ => Self::database_error(RepositoryOperation::Query, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::Query), "query");
        assert_eq!(format!("{}", RepositoryOperation::FindById), "find_by_id");
        assert_eq!(format!("{}", RepositoryOperation::Save), "save");
        assert_eq!(
            format!("{}", RepositoryOperation::BeginTransaction),
            "begin_transaction"
        );
        assert_eq!(format!("{}", RepositoryOperation::Rollback), "rollback");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(
            format!("{}", RepositoryErrorKind::InvalidArgument),
            "invalid_argument"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::Cancelled), "cancelled");
        assert_eq!(
            format!("{}", RepositoryErrorKind::ConcurrencyConflict),
            "concurrency_conflict"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::TransactionState),
            "transaction_state"
        );
    }

    #[test]
    fn test_with_entity_carries_context() {
        let error = RepositoryError::concurrency_conflict(RepositoryOperation::Save, "gone")
            .with_entity("cities", "7");
        assert_eq!(error.entity_type.as_deref(), Some("cities"));
        assert_eq!(error.entity_id.as_deref(), Some("7"));
        assert!(error.to_string().ends_with("[cities: 7]"));
    }

    #[test]
    fn test_with_operation_retags() {
        let error = RepositoryError::constraint_violation(RepositoryOperation::Save, "dup")
            .with_operation(RepositoryOperation::Commit);
        assert_eq!(error.operation, RepositoryOperation::Commit);
        assert_eq!(error.kind, RepositoryErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_is_retriable() {
        assert!(RepositoryError::connection_failed("refused").is_retriable());
        assert!(RepositoryError::timeout(RepositoryOperation::Query, "slow").is_retriable());
        assert!(
            RepositoryError::concurrency_conflict(RepositoryOperation::Save, "stale")
                .is_retriable()
        );
        assert!(
            !RepositoryError::invalid_argument(RepositoryOperation::Query, "empty").is_retriable()
        );
        assert!(!RepositoryError::cancelled(RepositoryOperation::Query).is_retriable());
    }

    #[test]
    fn test_display_without_entity() {
        let error = RepositoryError::transaction_state(
            RepositoryOperation::BeginTransaction,
            "a transaction is already active",
        );
        let display = error.to_string();
        assert!(display.contains("transaction_state"));
        assert!(display.contains("begin_transaction"));
        assert!(!display.contains('['));
    }

    #[test]
    fn test_serde_json_error_converts() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        let error: RepositoryError = err.into();
        assert_eq!(error.kind, RepositoryErrorKind::SerializationError);
    }
}
