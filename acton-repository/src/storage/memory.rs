//! In-process document storage
//!
//! [`MemoryStore`] is a cloneable handle to collections of JSON documents;
//! every [`MemorySession`] opened from it sees the same data. Useful for
//! tests and for services that want repository semantics without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::entity::{Entity, EntityKey, Tracking};
use crate::query::{Filter, Query};
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

use super::tracker::{ChangeTracker, EntityState, PendingChange};
use super::Session;

/// Collection name → storage key → document, in key order
type Collections = HashMap<String, BTreeMap<String, Value>>;

/// Shared in-memory document storage
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a unit of work against this store
    pub fn session(&self) -> MemorySession {
        MemorySession {
            store: self.clone(),
            tracker: ChangeTracker::new(),
            transaction: None,
        }
    }

    /// Number of committed documents in a collection
    pub async fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

/// An open transaction: a private copy plus the batches flushed into it
#[derive(Debug)]
struct WorkingCopy {
    collections: Collections,
    journal: Vec<PendingChange>,
}

/// Unit of work over a [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    tracker: ChangeTracker,
    transaction: Option<WorkingCopy>,
}

impl MemorySession {
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The change tracker, for inspecting pending marks
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    async fn documents(&self, collection: &str) -> Vec<Value> {
        match &self.transaction {
            Some(working) => working
                .collections
                .get(collection)
                .map(|docs| docs.values().cloned().collect())
                .unwrap_or_default(),
            None => self
                .store
                .collections
                .read()
                .await
                .get(collection)
                .map(|docs| docs.values().cloned().collect())
                .unwrap_or_default(),
        }
    }

    async fn document(&self, collection: &str, key: &str) -> Option<Value> {
        match &self.transaction {
            Some(working) => working
                .collections
                .get(collection)
                .and_then(|docs| docs.get(key).cloned()),
            None => self
                .store
                .collections
                .read()
                .await
                .get(collection)
                .and_then(|docs| docs.get(key).cloned()),
        }
    }

    async fn load<T: Entity>(&self, operation: RepositoryOperation) -> RepositoryResult<Vec<T>> {
        self.documents(T::COLLECTION)
            .await
            .into_iter()
            .map(|doc| ChangeTracker::decode(doc, operation))
            .collect()
    }
}

/// Apply a batch to `collections`, failing on the first change that cannot apply
fn apply_changes(collections: &mut Collections, changes: &[PendingChange]) -> RepositoryResult<u64> {
    let mut written = 0;
    for change in changes {
        let docs = collections.entry(change.collection.to_string()).or_default();
        match change.state {
            EntityState::Added => {
                if docs.contains_key(&change.key) {
                    return Err(RepositoryError::constraint_violation(
                        RepositoryOperation::Save,
                        "an entity with this key already exists",
                    )
                    .with_entity(change.collection, change.key.clone()));
                }
                docs.insert(change.key.clone(), change.document.clone());
            }
            EntityState::Modified => match docs.get_mut(&change.key) {
                Some(doc) => *doc = change.document.clone(),
                None => {
                    return Err(RepositoryError::concurrency_conflict(
                        RepositoryOperation::Save,
                        "update matched no stored entity",
                    )
                    .with_entity(change.collection, change.key.clone()));
                }
            },
            EntityState::Deleted => {
                if docs.remove(&change.key).is_none() {
                    return Err(RepositoryError::concurrency_conflict(
                        RepositoryOperation::Save,
                        "delete matched no stored entity",
                    )
                    .with_entity(change.collection, change.key.clone()));
                }
            }
        }
        written += 1;
    }
    Ok(written)
}

impl Session for MemorySession {
    async fn find<T: Entity>(
        &mut self,
        key: &T::Key,
        tracking: Tracking,
    ) -> RepositoryResult<Option<T>> {
        let Some(doc) = self.document(T::COLLECTION, &key.storage_key()).await else {
            return Ok(None);
        };
        let entity: T = ChangeTracker::decode(doc, RepositoryOperation::FindById)?;
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
        let count = match filter {
            None => self.documents(T::COLLECTION).await.len(),
            Some(filter) => self
                .load::<T>(RepositoryOperation::Count)
                .await?
                .iter()
                .filter(|e| filter.matches(e))
                .count(),
        };
        Ok(count as u64)
    }

    async fn exists<T: Entity>(&mut self, filter: Option<&Filter<T>>) -> RepositoryResult<bool> {
        match filter {
            None => Ok(!self.documents(T::COLLECTION).await.is_empty()),
            Some(filter) => Ok(self
                .load::<T>(RepositoryOperation::Any)
                .await?
                .iter()
                .any(|e| filter.matches(e))),
        }
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

        let written = match self.transaction.as_mut() {
            Some(working) => {
                let mut staged = working.collections.clone();
                let written = apply_changes(&mut staged, self.tracker.pending())?;
                working.collections = staged;
                working
                    .journal
                    .extend(self.tracker.pending().iter().cloned());
                written
            }
            None => {
                let mut committed = self.store.collections.write().await;
                let mut staged = committed.clone();
                let written = apply_changes(&mut staged, self.tracker.pending())?;
                *committed = staged;
                written
            }
        };

        self.tracker.accept_changes();
        tracing::debug!(written, "Flushed pending changes to memory store");
        Ok(written)
    }

    async fn begin_transaction(&mut self) -> RepositoryResult<()> {
        if self.transaction.is_some() {
            return Err(RepositoryError::transaction_state(
                RepositoryOperation::BeginTransaction,
                "a transaction is already active on this session",
            ));
        }
        let collections = self.store.collections.read().await.clone();
        self.transaction = Some(WorkingCopy {
            collections,
            journal: Vec::new(),
        });
        Ok(())
    }

    async fn commit_transaction(&mut self) -> RepositoryResult<()> {
        let Some(working) = self.transaction.take() else {
            return Ok(());
        };

        // Replay onto the latest committed state, not the snapshot taken at begin
        let mut committed = self.store.collections.write().await;
        let mut staged = committed.clone();
        if let Err(e) = apply_changes(&mut staged, &working.journal) {
            // Snapshots taken inside the transaction were never published
            self.tracker.reset();
            return Err(e.with_operation(RepositoryOperation::Commit));
        }
        *committed = staged;

        tracing::debug!(
            changes = working.journal.len(),
            "Committed memory transaction"
        );
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> RepositoryResult<()> {
        if self.transaction.take().is_some() {
            tracing::debug!("Rolled back memory transaction");
        }
        self.tracker.reset();
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderDirection, QueryComposer, QueryOptions};
    use crate::repository::RepositoryErrorKind;
    use crate::storage::test_support::City;

    async fn seeded(cities: &[City]) -> MemoryStore {
        let store = MemoryStore::new();
        let mut session = store.session();
        for city in cities {
            session.mark(city, EntityState::Added).unwrap();
        }
        session.flush().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_flush_makes_entities_visible() {
        let store = seeded(&[City::new(1, "A", 10), City::new(2, "B", 20)]).await;
        assert_eq!(store.document_count("cities").await, 2);

        let mut other = store.session();
        let found: Option<City> = other.find(&2, Tracking::Untracked).await.unwrap();
        assert_eq!(found, Some(City::new(2, "B", 20)));
    }

    #[tokio::test]
    async fn test_marks_are_invisible_until_flush() {
        let store = MemoryStore::new();
        let mut session = store.session();
        session.mark(&City::new(1, "A", 10), EntityState::Added).unwrap();

        assert_eq!(session.pending_changes(), 1);
        assert!(!session.exists::<City>(None).await.unwrap());

        assert_eq!(session.flush().await.unwrap(), 1);
        assert_eq!(session.pending_changes(), 0);
        assert!(session.exists::<City>(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_runs_query() {
        let store = seeded(&[
            City::new(1, "A", 50),
            City::new(2, "B", 10),
            City::new(3, "A", 100),
        ])
        .await;
        let options = QueryOptions::<City>::new()
            .sort_by(|c: &City| c.name.clone(), OrderDirection::Ascending)
            .sort_by(|c| c.population, OrderDirection::Descending);
        let query = QueryComposer::default()
            .compose(&options, RepositoryOperation::Query)
            .unwrap();

        let mut session = store.session();
        let ids: Vec<i64> = session
            .fetch(&query, Tracking::Untracked)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_tracked_fetch_attaches_snapshots() {
        let store = seeded(&[City::new(1, "A", 50)]).await;
        let mut session = store.session();

        session
            .fetch::<City>(&Query::all(), Tracking::Untracked)
            .await
            .unwrap();
        assert_eq!(session.tracker().tracked(), 0);

        session
            .fetch::<City>(&Query::all(), Tracking::Tracked)
            .await
            .unwrap();
        assert_eq!(session.tracker().tracked(), 1);
    }

    #[tokio::test]
    async fn test_count_and_exists_with_filter() {
        let store = seeded(&[
            City::new(1, "A", 5),
            City::new(2, "B", 15),
            City::new(3, "C", 25),
        ])
        .await;
        let mut session = store.session();
        let big = Filter::new(|c: &City| c.population > 10);
        let huge = Filter::new(|c: &City| c.population > 1_000);

        assert_eq!(session.count::<City>(None).await.unwrap(), 3);
        assert_eq!(session.count(Some(&big)).await.unwrap(), 2);
        assert!(session.exists(Some(&big)).await.unwrap());
        assert!(!session.exists(Some(&huge)).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_constraint_violation() {
        let store = seeded(&[City::new(1, "A", 5)]).await;
        let mut session = store.session();
        session.mark(&City::new(2, "B", 5), EntityState::Added).unwrap();
        session.mark(&City::new(1, "A", 5), EntityState::Added).unwrap();

        let err = session.flush().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ConstraintViolation);
        // Batch is atomic: entity 2 was not written either
        assert_eq!(store.document_count("cities").await, 1);
        assert_eq!(session.pending_changes(), 2);
    }

    #[tokio::test]
    async fn test_stale_update_is_concurrency_conflict() {
        let store = MemoryStore::new();
        let mut session = store.session();
        session.mark(&City::new(9, "Z", 1), EntityState::Modified).unwrap();

        let err = session.flush().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ConcurrencyConflict);
        assert_eq!(err.entity_id.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn test_transaction_commit_publishes() {
        let store = MemoryStore::new();
        let mut session = store.session();
        session.begin_transaction().await.unwrap();
        assert!(session.in_transaction());

        session.mark(&City::new(1, "A", 5), EntityState::Added).unwrap();
        session.flush().await.unwrap();

        // Visible inside the transaction, not outside
        assert!(session.exists::<City>(None).await.unwrap());
        assert_eq!(store.document_count("cities").await, 0);

        session.commit_transaction().await.unwrap();
        assert!(!session.in_transaction());
        assert_eq!(store.document_count("cities").await, 1);
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards() {
        let store = seeded(&[City::new(1, "A", 5)]).await;
        let mut session = store.session();
        session.begin_transaction().await.unwrap();
        session.mark(&City::new(1, "A", 5), EntityState::Deleted).unwrap();
        session.flush().await.unwrap();
        session.mark(&City::new(2, "B", 5), EntityState::Added).unwrap();

        session.rollback_transaction().await.unwrap();
        assert_eq!(session.pending_changes(), 0);
        assert_eq!(store.document_count("cities").await, 1);
        assert!(session.find::<City>(&1, Tracking::Untracked).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_nested_begin_is_rejected() {
        let store = MemoryStore::new();
        let mut session = store.session();
        session.begin_transaction().await.unwrap();
        let err = session.begin_transaction().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::TransactionState);
    }

    #[tokio::test]
    async fn test_commit_replays_onto_latest_state() {
        let store = MemoryStore::new();
        let mut tx_session = store.session();
        tx_session.begin_transaction().await.unwrap();
        tx_session.mark(&City::new(1, "A", 5), EntityState::Added).unwrap();
        tx_session.flush().await.unwrap();

        // Another session commits a different entity meanwhile
        let mut other = store.session();
        other.mark(&City::new(2, "B", 5), EntityState::Added).unwrap();
        other.flush().await.unwrap();

        tx_session.commit_transaction().await.unwrap();
        assert_eq!(store.document_count("cities").await, 2);
    }

    #[tokio::test]
    async fn test_failed_commit_forgets_transaction_snapshots() {
        let store = MemoryStore::new();
        let mut tx_session = store.session();
        tx_session.begin_transaction().await.unwrap();
        tx_session.mark(&City::new(1, "TX", 5), EntityState::Added).unwrap();
        tx_session.flush().await.unwrap();
        assert_eq!(tx_session.tracker().tracked(), 1);

        let mut other = store.session();
        other.mark(&City::new(1, "OTHER", 5), EntityState::Added).unwrap();
        other.flush().await.unwrap();

        let err = tx_session.commit_transaction().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ConstraintViolation);
        assert_eq!(err.operation, RepositoryOperation::Commit);
        assert!(!tx_session.in_transaction());
        assert_eq!(tx_session.tracker().tracked(), 0);

        // The transaction's state is no longer mistaken for the stored one
        tx_session.mark(&City::new(1, "TX", 5), EntityState::Modified).unwrap();
        assert_eq!(tx_session.pending_changes(), 1);
        tx_session.flush().await.unwrap();

        let mut reader = store.session();
        let stored: Option<City> = reader.find(&1, Tracking::Untracked).await.unwrap();
        assert_eq!(stored.map(|c| c.name), Some("TX".to_string()));
    }
}
