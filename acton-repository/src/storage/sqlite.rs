//! SQLite-backed sessions
//!
//! Entities are stored as JSON documents in one table keyed by
//! `(collection, id)`. Filters and sort keys are Rust closures, so filtered
//! reads load the collection and run the composed [`Query`] in process;
//! unfiltered counts and existence checks are answered by SQL.

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, Executor, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::config::DatabaseConfig;
use crate::entity::{Entity, EntityKey, Tracking};
use crate::query::{Filter, Query};
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

use super::tracker::{ChangeTracker, EntityState, PendingChange};
use super::Session;

/// Table holding every collection's documents
pub const DOCUMENTS_TABLE: &str = "acton_documents";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS acton_documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (collection, id)
)";
const SELECT_COLLECTION: &str =
    "SELECT body FROM acton_documents WHERE collection = ?1 ORDER BY id";
const SELECT_DOCUMENT: &str = "SELECT body FROM acton_documents WHERE collection = ?1 AND id = ?2";
const COUNT_COLLECTION: &str = "SELECT COUNT(*) FROM acton_documents WHERE collection = ?1";
const EXISTS_IN_COLLECTION: &str =
    "SELECT EXISTS(SELECT 1 FROM acton_documents WHERE collection = ?1)";
const INSERT_DOCUMENT: &str =
    "INSERT INTO acton_documents (collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)";
const UPDATE_DOCUMENT: &str =
    "UPDATE acton_documents SET body = ?3, updated_at = ?4 WHERE collection = ?1 AND id = ?2";
const DELETE_DOCUMENT: &str = "DELETE FROM acton_documents WHERE collection = ?1 AND id = ?2";

/// Create a SQLite connection pool with retry logic
///
/// Uses exponential backoff between attempts, up to `config.max_retries`
/// retries. In-memory databases are pinned to a single long-lived
/// connection, since every SQLite connection opens its own private one.
pub async fn connect(config: &DatabaseConfig) -> RepositoryResult<SqlitePool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_connect(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "Database connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "Database connection pool created: max={}, min={}",
                        config.max_connections,
                        config.min_connections
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    tracing::error!(
                        "Failed to connect to database after {} attempts: {}",
                        config.max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));
                tracing::warn!(
                    "Database connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_connect(config: &DatabaseConfig) -> RepositoryResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| {
            RepositoryError::connection_failed(format!(
                "Invalid SQLite URL '{}': {}",
                config.url, e
            ))
        })?
        .create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new()
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs));
    pool_options = if is_in_memory(&config.url) {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
    };

    pool_options.connect_with(options).await.map_err(|e| {
        RepositoryError::connection_failed(format!(
            "Failed to open database at '{}': {}\n\n\
            Troubleshooting:\n\
            1. Check the URL format: sqlite://path/to/file.db or sqlite::memory:\n\
            2. Verify the parent directory exists and is writable\n\
            3. Make sure no other process holds an exclusive lock on the file\n\n\
            Original error: {}",
            config.url,
            categorize_db_error(&e),
            e
        ))
    })
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn categorize_db_error(err: &sqlx::Error) -> &'static str {
    use sqlx::Error;
    match err {
        Error::Configuration(_) => "Configuration error",
        Error::Database(_) => "Database error",
        Error::Io(_) => "File I/O error - check path and permissions",
        Error::PoolTimedOut => "Connection pool timeout - database may be locked",
        Error::PoolClosed => "Connection pool closed",
        Error::WorkerCrashed => "Database worker crashed",
        _ => "Connection error",
    }
}

/// Stream a collection's documents in key order
async fn load_documents<'e, E>(
    executor: E,
    collection: &'static str,
) -> RepositoryResult<Vec<Value>>
where
    E: Executor<'e, Database = Sqlite> + 'e,
{
    let mut rows = sqlx::query_scalar::<_, String>(SELECT_COLLECTION)
        .bind(collection)
        .fetch(executor);

    let mut documents = Vec::new();
    while let Some(body) = rows.try_next().await? {
        documents.push(serde_json::from_str(&body)?);
    }
    Ok(documents)
}

/// Write a batch through one connection, failing on the first stale change
async fn apply_changes(
    conn: &mut SqliteConnection,
    changes: &[PendingChange],
) -> RepositoryResult<u64> {
    let now = Utc::now();
    let mut written = 0;

    for change in changes {
        let body = change.document.to_string();
        let statement = match change.state {
            EntityState::Added => INSERT_DOCUMENT,
            EntityState::Modified => UPDATE_DOCUMENT,
            EntityState::Deleted => DELETE_DOCUMENT,
        };
        let mut query = sqlx::query(statement)
            .bind(change.collection)
            .bind(change.key.as_str());
        if change.state != EntityState::Deleted {
            query = query.bind(body).bind(now);
        }

        let result = query.execute(&mut *conn).await.map_err(|e| {
            RepositoryError::from(e)
                .with_operation(RepositoryOperation::Save)
                .with_entity(change.collection, change.key.clone())
        })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::concurrency_conflict(
                RepositoryOperation::Save,
                format!("{} matched no stored entity", change.state.operation()),
            )
            .with_entity(change.collection, change.key.clone()));
        }
        written += result.rows_affected();
    }

    Ok(written)
}

/// Unit of work over a SQLite pool
///
/// # Example
///
/// ```rust,no_run
/// use acton_repository::config::DatabaseConfig;
/// use acton_repository::storage::SqliteSession;
///
/// # async fn example() -> acton_repository::repository::RepositoryResult<()> {
/// let config = DatabaseConfig {
///     url: "sqlite://cities.db".to_string(),
///     ..DatabaseConfig::default()
/// };
/// let session = SqliteSession::connect(&config).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteSession {
    pool: SqlitePool,
    tracker: ChangeTracker,
    transaction: Option<Transaction<'static, Sqlite>>,
}

impl SqliteSession {
    /// Open a pool from configuration and start a session on it
    pub async fn connect(config: &DatabaseConfig) -> RepositoryResult<Self> {
        let pool = connect(config).await?;
        Self::new(pool).await
    }

    /// Start a session on an existing pool, creating the documents table if needed
    pub async fn new(pool: SqlitePool) -> RepositoryResult<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self {
            pool,
            tracker: ChangeTracker::new(),
            transaction: None,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    async fn load<T: Entity>(&mut self, operation: RepositoryOperation) -> RepositoryResult<Vec<T>> {
        let documents = match self.transaction.as_mut() {
            Some(tx) => load_documents(&mut **tx, T::COLLECTION).await,
            None => load_documents(&self.pool, T::COLLECTION).await,
        }
        .map_err(|e| e.with_operation(operation))?;

        documents
            .into_iter()
            .map(|doc| ChangeTracker::decode(doc, operation))
            .collect()
    }
}

impl Session for SqliteSession {
    async fn find<T: Entity>(
        &mut self,
        key: &T::Key,
        tracking: Tracking,
    ) -> RepositoryResult<Option<T>> {
        let key = key.storage_key();
        let query = sqlx::query_scalar::<_, String>(SELECT_DOCUMENT)
            .bind(T::COLLECTION)
            .bind(key.as_str());
        let body = match self.transaction.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await,
            None => query.fetch_optional(&self.pool).await,
        }
        .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::FindById))?;

        let Some(body) = body else {
            return Ok(None);
        };
        let entity: T = serde_json::from_str(&body).map_err(|e| {
            RepositoryError::serialization_error(RepositoryOperation::FindById, e.to_string())
                .with_entity(T::COLLECTION, key.clone())
        })?;
        if tracking.is_tracked() {
            self.tracker.attach(&entity)?;
        }
        Ok(Some(entity))
    }

    async fn fetch<T: Entity>(
        &mut self,
        query: &Query<T>,
        tracking: Tracking,
    ) -> RepositoryResult<Vec<T>> {
        let base = self.load::<T>(RepositoryOperation::Query).await?;
        let rows = query.execute(base);
        if tracking.is_tracked() {
            for entity in &rows {
                self.tracker.attach(entity)?;
            }
        }
        Ok(rows)
    }

    async fn count<T: Entity>(&mut self, filter: Option<&Filter<T>>) -> RepositoryResult<u64> {
        if let Some(filter) = filter {
            let rows = self.load::<T>(RepositoryOperation::Count).await?;
            return Ok(rows.iter().filter(|e| filter.matches(e)).count() as u64);
        }

        let query = sqlx::query_scalar::<_, i64>(COUNT_COLLECTION).bind(T::COLLECTION);
        let count = match self.transaction.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await,
            None => query.fetch_one(&self.pool).await,
        }
        .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Count))?;

        u64::try_from(count).map_err(|_| {
            RepositoryError::database_error(
                RepositoryOperation::Count,
                format!("negative row count {}", count),
            )
        })
    }

    async fn exists<T: Entity>(&mut self, filter: Option<&Filter<T>>) -> RepositoryResult<bool> {
        if let Some(filter) = filter {
            let rows = self.load::<T>(RepositoryOperation::Any).await?;
            return Ok(rows.iter().any(|e| filter.matches(e)));
        }

        let query = sqlx::query_scalar::<_, i64>(EXISTS_IN_COLLECTION).bind(T::COLLECTION);
        let exists = match self.transaction.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await,
            None => query.fetch_one(&self.pool).await,
        }
        .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Any))?;
        Ok(exists != 0)
    }

    fn mark<T: Entity>(&mut self, entity: &T, state: EntityState) -> RepositoryResult<()> {
        self.tracker.mark(entity, state).map(|_| ())
    }

    fn pending_changes(&self) -> usize {
        self.tracker.len()
    }

    fn discard_changes(&mut self) {
        self.tracker.discard();
    }

    async fn flush(&mut self) -> RepositoryResult<u64> {
        if self.tracker.is_empty() {
            return Ok(0);
        }

        let map_err = |e: sqlx::Error| RepositoryError::from(e).with_operation(RepositoryOperation::Save);
        let written = match self.transaction.as_mut() {
            // A savepoint keeps the batch atomic inside the open transaction
            Some(tx) => {
                let mut savepoint = Connection::begin(&mut **tx).await.map_err(map_err)?;
                let written = apply_changes(&mut savepoint, self.tracker.pending()).await?;
                savepoint.commit().await.map_err(map_err)?;
                written
            }
            None => {
                let mut tx = self.pool.begin().await.map_err(map_err)?;
                let written = apply_changes(&mut tx, self.tracker.pending()).await?;
                tx.commit().await.map_err(map_err)?;
                written
            }
        };

        self.tracker.accept_changes();
        tracing::debug!(written, "Flushed pending changes to SQLite");
        Ok(written)
    }

    async fn begin_transaction(&mut self) -> RepositoryResult<()> {
        if self.transaction.is_some() {
            return Err(RepositoryError::transaction_state(
                RepositoryOperation::BeginTransaction,
                "a transaction is already active on this session",
            ));
        }
        let tx = self.pool.begin().await.map_err(|e| {
            RepositoryError::from(e).with_operation(RepositoryOperation::BeginTransaction)
        })?;
        self.transaction = Some(tx);
        Ok(())
    }

    async fn commit_transaction(&mut self) -> RepositoryResult<()> {
        let Some(tx) = self.transaction.take() else {
            return Ok(());
        };
        if let Err(e) = tx.commit().await {
            // Snapshots taken inside the transaction were never published
            self.tracker.reset();
            return Err(RepositoryError::from(e).with_operation(RepositoryOperation::Commit));
        }
        tracing::debug!("Committed SQLite transaction");
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> RepositoryResult<()> {
        self.tracker.reset();
        let Some(tx) = self.transaction.take() else {
            return Ok(());
        };
        tx.rollback()
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Rollback))?;
        tracing::debug!("Rolled back SQLite transaction");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}
