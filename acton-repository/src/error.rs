//! Crate-level error type
//!
//! Repository verbs return [`RepositoryError`](crate::repository::RepositoryError)
//! directly. This type covers everything around them: loading
//! configuration, installing the subscriber, and repository failures that
//! surface during setup.

use thiserror::Error;

use crate::repository::RepositoryError;

/// Main error type for the crate
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Configuration parsed but holds inconsistent values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Structured repository error with operation context
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// Tracing subscriber could not be installed
    #[error("Tracing initialization failed: {0}")]
    Tracing(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryOperation;

    #[test]
    fn test_repository_error_is_transparent() {
        let inner = RepositoryError::cancelled(RepositoryOperation::Save);
        let display = inner.to_string();
        let error: Error = inner.into();
        assert_eq!(error.to_string(), display);
    }

    #[test]
    fn test_figment_error_is_boxed() {
        let error: Error = figment::Error::from("missing field `url`".to_string()).into();
        assert!(matches!(error, Error::Config(_)));
        assert!(error.to_string().starts_with("Configuration error:"));
    }
}
