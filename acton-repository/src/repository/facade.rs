//! The repository façade
//!
//! [`RepositoryFacade`] puts one entity type's reads, change marking and
//! transaction control behind a single object over any [`Session`].

use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PagingConfig;
use crate::entity::{Entity, Tracking};
use crate::query::{Filter, Page, Query, QueryComposer, QueryOptions};
use crate::storage::{EntityState, Session};

use super::error::{RepositoryError, RepositoryOperation};
use super::traits::RepositoryResult;

/// Identifies the transaction opened by [`RepositoryFacade::begin_transaction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHandle {
    id: Uuid,
    started_at: DateTime<Utc>,
}

impl TransactionHandle {
    fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            started_at: Utc::now(),
        }
    }

    /// Time-ordered identifier, useful for correlating log lines
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// How long the transaction has been open
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Run a collaborator call, racing it against the caller's token
///
/// Errors are re-tagged with the façade verb that made the call.
async fn guarded<F, R>(
    token: Option<&CancellationToken>,
    operation: RepositoryOperation,
    call: F,
) -> RepositoryResult<R>
where
    F: Future<Output = RepositoryResult<R>>,
{
    let result = match token {
        Some(token) if token.is_cancelled() => Err(RepositoryError::cancelled(operation)),
        Some(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(RepositoryError::cancelled(operation)),
                result = call => result,
            }
        }
        None => call.await,
    };
    result.map_err(|e| e.with_operation(operation))
}

/// Generic repository over one entity type
///
/// Reads take a [`QueryOptions`] describing tracking, filter, ordering and
/// page. Writes only mark entities; nothing reaches storage until
/// [`save`](Self::save) or [`commit`](Self::commit). Methods take `&mut self`,
/// so one façade serves one logical caller at a time.
///
/// # Example
///
/// ```rust
/// use acton_repository::prelude::*;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct City {
///     id: i64,
///     name: String,
///     population: u64,
/// }
///
/// impl Entity for City {
///     type Key = i64;
///     const COLLECTION: &'static str = "cities";
///
///     fn key(&self) -> i64 {
///         self.id
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> RepositoryResult<()> {
/// let store = MemoryStore::new();
/// let mut cities = RepositoryFacade::<City, _>::new(store.session());
///
/// cities.add(City { id: 1, name: "Oslo".into(), population: 700_000 })?;
/// cities.add(City { id: 2, name: "Bergen".into(), population: 285_000 })?;
/// assert_eq!(cities.save().await?, 2);
///
/// let large = cities
///     .query(
///         &QueryOptions::new()
///             .filter(|c: &City| c.population > 500_000)
///             .sort_by(|c| c.name.clone(), OrderDirection::Ascending),
///     )
///     .await?;
/// assert_eq!(large.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct RepositoryFacade<T: Entity, S: Session> {
    session: S,
    composer: QueryComposer,
    paging: PagingConfig,
    transaction: Option<TransactionHandle>,
    cancellation: Option<CancellationToken>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, S: Session> RepositoryFacade<T, S> {
    /// Create a façade with default paging limits
    pub fn new(session: S) -> Self {
        Self::with_config(session, &PagingConfig::default())
    }

    /// Create a façade with configured paging limits
    pub fn with_config(session: S, paging: &PagingConfig) -> Self {
        Self {
            session,
            composer: QueryComposer::new(paging.max_page_size),
            paging: *paging,
            transaction: None,
            cancellation: None,
            _entity: PhantomData,
        }
    }

    /// Abort in-flight and future operations once `token` is cancelled
    ///
    /// Cancellation never undoes marks or flushed work; only
    /// [`rollback`](Self::rollback) does.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn paging(&self) -> &PagingConfig {
        &self.paging
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// The active transaction, if any
    pub fn transaction(&self) -> Option<&TransactionHandle> {
        self.transaction.as_ref()
    }

    /// Whether marks are waiting for the next save
    pub fn has_pending_changes(&self) -> bool {
        self.session.pending_changes() > 0
    }

    fn ensure_not_cancelled(&self, operation: RepositoryOperation) -> RepositoryResult<()> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(RepositoryError::cancelled(operation)),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Compose a read without executing it
    pub fn compose(&self, options: &QueryOptions<T>) -> RepositoryResult<Query<T>> {
        self.composer.compose(options, RepositoryOperation::Query)
    }

    /// All entities matching `options`; the filter is optional
    pub async fn query(&mut self, options: &QueryOptions<T>) -> RepositoryResult<Vec<T>> {
        let query = self.composer.compose(options, RepositoryOperation::Query)?;
        self.run(&query, options.tracking_mode(), RepositoryOperation::Query)
            .await
    }

    /// Like [`query`](Self::query), but the options must carry a filter
    pub async fn find(&mut self, options: &QueryOptions<T>) -> RepositoryResult<Vec<T>> {
        let query = self
            .composer
            .compose_filtered(options, RepositoryOperation::Query)?;
        self.run(&query, options.tracking_mode(), RepositoryOperation::Query)
            .await
    }

    /// One page of matching entities plus the total across all pages
    ///
    /// Without a page in `options`, the first page at
    /// `paging.default_page_size` is returned.
    pub async fn query_page(&mut self, options: &QueryOptions<T>) -> RepositoryResult<Page<T>> {
        let request = options
            .page_request()
            .unwrap_or_else(|| self.paging.default_request());
        let options = options.clone().with_page(request);
        let query = self.composer.compose(&options, RepositoryOperation::Query)?;

        let total = guarded(
            self.cancellation.as_ref(),
            RepositoryOperation::Query,
            self.session.count(query.filter()),
        )
        .await?;
        let items = self
            .run(&query, options.tracking_mode(), RepositoryOperation::Query)
            .await?;
        Ok(Page::new(items, request, total))
    }

    /// Tracked lookup by primary key
    pub async fn get_by_id(&mut self, key: &T::Key) -> RepositoryResult<Option<T>> {
        self.lookup(key, Tracking::Tracked).await
    }

    /// Lookup by primary key that the unit of work does not remember
    pub async fn get_by_id_untracked(&mut self, key: &T::Key) -> RepositoryResult<Option<T>> {
        self.lookup(key, Tracking::Untracked).await
    }

    /// The first entity of the composed query, if any
    pub async fn first(&mut self, options: &QueryOptions<T>) -> RepositoryResult<Option<T>> {
        let query = self.composer.compose(options, RepositoryOperation::First)?;
        let rows = self
            .run(&query, options.tracking_mode(), RepositoryOperation::First)
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Like [`first`](Self::first), but the options must carry a filter
    pub async fn first_where(&mut self, options: &QueryOptions<T>) -> RepositoryResult<Option<T>> {
        let query = self
            .composer
            .compose_filtered(options, RepositoryOperation::First)?;
        let rows = self
            .run(&query, options.tracking_mode(), RepositoryOperation::First)
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Number of entities, optionally only those matching `filter`
    ///
    /// # Errors
    ///
    /// `Overflow` when the count does not fit in a `u32`; use
    /// [`count_wide`](Self::count_wide) for large collections.
    pub async fn count(&mut self, filter: Option<&Filter<T>>) -> RepositoryResult<u32> {
        let count = self.count_wide(filter).await?;
        u32::try_from(count).map_err(|_| {
            RepositoryError::overflow(
                RepositoryOperation::Count,
                format!("{} entities do not fit in a 32-bit count", count),
            )
            .with_entity(T::COLLECTION, "*")
        })
    }

    /// Number of entities as a 64-bit count
    pub async fn count_wide(&mut self, filter: Option<&Filter<T>>) -> RepositoryResult<u64> {
        let count = guarded(
            self.cancellation.as_ref(),
            RepositoryOperation::Count,
            self.session.count(filter),
        )
        .await?;
        tracing::debug!(collection = T::COLLECTION, count, "count");
        Ok(count)
    }

    /// Whether any entity exists, optionally matching `filter`
    pub async fn any(&mut self, filter: Option<&Filter<T>>) -> RepositoryResult<bool> {
        guarded(
            self.cancellation.as_ref(),
            RepositoryOperation::Any,
            self.session.exists(filter),
        )
        .await
    }

    async fn lookup(&mut self, key: &T::Key, tracking: Tracking) -> RepositoryResult<Option<T>> {
        let found = guarded(
            self.cancellation.as_ref(),
            RepositoryOperation::FindById,
            self.session.find::<T>(key, tracking),
        )
        .await?;
        tracing::debug!(
            collection = T::COLLECTION,
            key = ?key,
            %tracking,
            found = found.is_some(),
            "get_by_id"
        );
        Ok(found)
    }

    async fn run(
        &mut self,
        query: &Query<T>,
        tracking: Tracking,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<T>> {
        let rows = guarded(
            self.cancellation.as_ref(),
            operation,
            self.session.fetch(query, tracking),
        )
        .await?;
        tracing::debug!(
            collection = T::COLLECTION,
            %operation,
            %tracking,
            returned = rows.len(),
            "query executed"
        );
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Change marking
    // ------------------------------------------------------------------

    fn mark_one(
        &mut self,
        entity: &T,
        state: EntityState,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        self.session
            .mark(entity, state)
            .map_err(|e| e.with_operation(operation))
    }

    /// Mark an entity for insertion; returns it for chaining
    ///
    /// The key is the caller's to set.
    pub fn add(&mut self, entity: T) -> RepositoryResult<T> {
        self.ensure_not_cancelled(RepositoryOperation::Add)?;
        self.mark_one(&entity, EntityState::Added, RepositoryOperation::Add)?;
        Ok(entity)
    }

    /// Mark several entities for insertion
    ///
    /// Stops at the first entity that cannot be marked; earlier marks stay.
    pub fn add_many<I>(&mut self, entities: I) -> RepositoryResult<Vec<T>>
    where
        I: IntoIterator<Item = T>,
    {
        self.ensure_not_cancelled(RepositoryOperation::Add)?;
        entities
            .into_iter()
            .map(|entity| {
                self.mark_one(&entity, EntityState::Added, RepositoryOperation::Add)?;
                Ok(entity)
            })
            .collect()
    }

    /// Mark an entity for modification
    ///
    /// A tracked entity equal to its loaded state is not marked at all. A
    /// key matching no stored entity fails at save time with
    /// `ConcurrencyConflict`.
    pub fn update(&mut self, entity: T) -> RepositoryResult<T> {
        self.ensure_not_cancelled(RepositoryOperation::Update)?;
        self.mark_one(&entity, EntityState::Modified, RepositoryOperation::Update)?;
        Ok(entity)
    }

    /// Mark several entities for modification
    pub fn update_many<I>(&mut self, entities: I) -> RepositoryResult<Vec<T>>
    where
        I: IntoIterator<Item = T>,
    {
        self.ensure_not_cancelled(RepositoryOperation::Update)?;
        entities
            .into_iter()
            .map(|entity| {
                self.mark_one(&entity, EntityState::Modified, RepositoryOperation::Update)?;
                Ok(entity)
            })
            .collect()
    }

    /// Mark an entity for deletion
    pub fn remove(&mut self, entity: &T) -> RepositoryResult<()> {
        self.ensure_not_cancelled(RepositoryOperation::Remove)?;
        self.mark_one(entity, EntityState::Deleted, RepositoryOperation::Remove)
    }

    /// Mark several entities for deletion
    pub fn remove_many<I>(&mut self, entities: I) -> RepositoryResult<()>
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        self.ensure_not_cancelled(RepositoryOperation::Remove)?;
        for entity in entities {
            self.mark_one(entity.borrow(), EntityState::Deleted, RepositoryOperation::Remove)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Unit of work
    // ------------------------------------------------------------------

    /// Flush every pending mark as one batch; returns the records written
    pub async fn save(&mut self) -> RepositoryResult<u64> {
        let pending = self.session.pending_changes();
        let written = guarded(
            self.cancellation.as_ref(),
            RepositoryOperation::Save,
            self.session.flush(),
        )
        .await?;
        tracing::debug!(
            collection = T::COLLECTION,
            pending,
            written,
            transaction = ?self.transaction.map(|t| t.id()),
            "save"
        );
        Ok(written)
    }

    /// Open a transaction around subsequent saves
    ///
    /// # Errors
    ///
    /// `TransactionState` if this façade already has one open.
    pub async fn begin_transaction(&mut self) -> RepositoryResult<TransactionHandle> {
        if let Some(active) = &self.transaction {
            return Err(RepositoryError::transaction_state(
                RepositoryOperation::BeginTransaction,
                format!("transaction {} is already active", active),
            ));
        }

        guarded(
            self.cancellation.as_ref(),
            RepositoryOperation::BeginTransaction,
            self.session.begin_transaction(),
        )
        .await?;

        let handle = TransactionHandle::new();
        self.transaction = Some(handle);
        tracing::debug!(collection = T::COLLECTION, transaction = %handle, "transaction started");
        Ok(handle)
    }

    /// Save pending marks, then commit the active transaction
    ///
    /// If the save fails the transaction is rolled back once and the save
    /// error is returned unchanged (its operation stays `Save`); a failure
    /// of that rollback is logged, not returned. Without an active
    /// transaction this only saves.
    ///
    /// Cancellation can interrupt the save. Once the save succeeded the
    /// storage commit always runs to completion, and if it fails the
    /// session's transaction is rolled back so no transaction outlives the
    /// handle.
    pub async fn commit(&mut self) -> RepositoryResult<u64> {
        let written = match self.save().await {
            Ok(written) => written,
            Err(error) => {
                if let Err(rollback_error) = self.rollback().await {
                    tracing::warn!(
                        collection = T::COLLECTION,
                        error = %rollback_error,
                        "Rollback after failed commit also failed"
                    );
                }
                return Err(error);
            }
        };

        let Some(handle) = self.transaction.take() else {
            return Ok(written);
        };
        if let Err(error) = self.session.commit_transaction().await {
            self.session.discard_changes();
            if let Err(rollback_error) = self.session.rollback_transaction().await {
                tracing::warn!(
                    collection = T::COLLECTION,
                    transaction = %handle,
                    error = %rollback_error,
                    "Rollback after failed storage commit also failed"
                );
            }
            return Err(error.with_operation(RepositoryOperation::Commit));
        }

        tracing::debug!(
            collection = T::COLLECTION,
            transaction = %handle,
            written,
            elapsed_ms = handle.elapsed().num_milliseconds(),
            "transaction committed"
        );
        Ok(written)
    }

    /// Roll back the active transaction and drop pending marks
    ///
    /// A no-op without an active transaction. Not subject to cancellation.
    pub async fn rollback(&mut self) -> RepositoryResult<()> {
        let Some(handle) = self.transaction.take() else {
            return Ok(());
        };

        self.session.discard_changes();
        self.session
            .rollback_transaction()
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Rollback))?;

        tracing::debug!(collection = T::COLLECTION, transaction = %handle, "transaction rolled back");
        Ok(())
    }
}

impl<T: Entity, S: Session + fmt::Debug> fmt::Debug for RepositoryFacade<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryFacade")
            .field("collection", &T::COLLECTION)
            .field("session", &self.session)
            .field("paging", &self.paging)
            .field("transaction", &self.transaction)
            .finish()
    }
}
