//! Storage sessions: the unit of work underneath a repository façade
//!
//! A [`Session`] owns the persistence context for one logical unit of work.
//! It answers reads, accumulates marked changes until a flush writes them as
//! one batch, and optionally brackets several flushes in a transaction.
//!
//! # Bundled sessions
//!
//! - [`MemorySession`]: documents held in a shared [`MemoryStore`]
//! - [`SqliteSession`]: documents in a SQLite table (feature `database`)
//!
//! Both keep their pending marks in a [`ChangeTracker`].
//!
//! # Implementing a session
//!
//! Async methods return `impl Future + Send`, so implementations can use
//! plain `async fn`:
//!
//! ```rust,ignore
//! impl Session for MySession {
//!     async fn find<T: Entity>(
//!         &mut self,
//!         key: &T::Key,
//!         tracking: Tracking,
//!     ) -> RepositoryResult<Option<T>> {
//!         // ...
//!     }
//!     // ...
//! }
//! ```

use std::future::Future;

use crate::entity::{Entity, Tracking};
use crate::query::{Filter, Query};
use crate::repository::RepositoryResult;

mod memory;
#[cfg(feature = "database")]
mod sqlite;
mod tracker;

pub use memory::{MemorySession, MemoryStore};
#[cfg(feature = "database")]
pub use sqlite::{connect, SqliteSession, DOCUMENTS_TABLE};
pub use tracker::{ChangeTracker, EntityState, PendingChange};

/// Persistence context consumed by [`RepositoryFacade`](crate::repository::RepositoryFacade)
///
/// Reads observe the session's own flushed writes. Marks are not visible to
/// reads until flushed.
pub trait Session: Send {
    /// Look up one entity by key
    fn find<T: Entity>(
        &mut self,
        key: &T::Key,
        tracking: Tracking,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Run a composed query over the entity's collection
    ///
    /// The base sequence is the collection in ascending storage-key order.
    fn fetch<T: Entity>(
        &mut self,
        query: &Query<T>,
        tracking: Tracking,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Count entities, optionally only those matching `filter`
    fn count<T: Entity>(
        &mut self,
        filter: Option<&Filter<T>>,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Whether at least one entity exists, optionally matching `filter`
    fn exists<T: Entity>(
        &mut self,
        filter: Option<&Filter<T>>,
    ) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Record a persistence intent without touching storage
    fn mark<T: Entity>(&mut self, entity: &T, state: EntityState) -> RepositoryResult<()>;

    /// Number of marks waiting for the next flush
    fn pending_changes(&self) -> usize;

    /// Drop every pending mark
    fn discard_changes(&mut self);

    /// Write all pending marks as one atomic batch
    ///
    /// Returns the number of rows written. On failure nothing from the batch
    /// is applied and the marks stay pending.
    fn flush(&mut self) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Open a storage transaction
    fn begin_transaction(&mut self) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Make the transaction's flushed work durable
    fn commit_transaction(&mut self) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Discard the transaction's flushed work and every pending mark
    fn rollback_transaction(&mut self) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Whether a storage transaction is open
    fn in_transaction(&self) -> bool;
}
