//! Unit-of-work bookkeeping shared by the bundled sessions
//!
//! [`ChangeTracker`] records which documents are pending insertion,
//! modification or deletion, and remembers the loaded state of tracked
//! entities so that updating an unchanged entity costs nothing at flush.

use std::collections::HashMap;

use serde_json::Value;

use crate::entity::{Entity, EntityKey};
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

/// Persistence intent attached to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Insert on the next flush
    Added,
    /// Overwrite on the next flush
    Modified,
    /// Delete on the next flush
    Deleted,
}

impl EntityState {
    pub(crate) fn operation(self) -> RepositoryOperation {
        match self {
            Self::Added => RepositoryOperation::Add,
            Self::Modified => RepositoryOperation::Update,
            Self::Deleted => RepositoryOperation::Remove,
        }
    }
}

/// A document waiting to be written
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub collection: &'static str,
    pub key: String,
    pub state: EntityState,
    pub document: Value,
}

type DocumentId = (&'static str, String);

/// Pending marks in first-marked order plus snapshots of tracked entities
#[derive(Debug, Default)]
pub struct ChangeTracker {
    pending: Vec<PendingChange>,
    snapshots: HashMap<DocumentId, Value>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize an entity into its storage document
    pub fn encode<T: Entity>(entity: &T, operation: RepositoryOperation) -> RepositoryResult<Value> {
        serde_json::to_value(entity).map_err(|e| {
            RepositoryError::serialization_error(operation, e.to_string())
                .with_entity(T::COLLECTION, entity.key().storage_key())
        })
    }

    /// Deserialize a storage document into an entity
    pub fn decode<T: Entity>(document: Value, operation: RepositoryOperation) -> RepositoryResult<T> {
        serde_json::from_value(document).map_err(|e| {
            RepositoryError::serialization_error(operation, e.to_string())
                .with_entity(T::COLLECTION, "<undecodable>")
        })
    }

    /// Remember the loaded state of a tracked entity
    pub fn attach<T: Entity>(&mut self, entity: &T) -> RepositoryResult<()> {
        let document = Self::encode(entity, RepositoryOperation::Query)?;
        self.snapshots
            .insert((T::COLLECTION, entity.key().storage_key()), document);
        Ok(())
    }

    /// Record a persistence intent for an entity
    ///
    /// Marks on the same document coalesce: add-then-update stays an insert,
    /// add-then-remove cancels out, remove-then-add becomes an overwrite.
    /// Updating a tracked entity back to its loaded state drops the mark.
    /// Returns whether a change is pending for the document afterwards.
    pub fn mark<T: Entity>(&mut self, entity: &T, state: EntityState) -> RepositoryResult<bool> {
        let document = Self::encode(entity, state.operation())?;
        let key = entity.key().storage_key();
        let id = (T::COLLECTION, key);
        let position = self
            .pending
            .iter()
            .position(|c| c.collection == id.0 && c.key == id.1);

        let unchanged = state == EntityState::Modified
            && self.snapshots.get(&id).is_some_and(|snap| *snap == document);

        match position {
            None if unchanged => Ok(false),
            None => {
                self.pending.push(PendingChange {
                    collection: id.0,
                    key: id.1,
                    state,
                    document,
                });
                Ok(true)
            }
            Some(index) => {
                let previous = self.pending[index].state;
                let next = match (previous, state) {
                    (EntityState::Added, EntityState::Deleted) => None,
                    (EntityState::Added, _) => Some(EntityState::Added),
                    (EntityState::Deleted, EntityState::Added) => Some(EntityState::Modified),
                    (EntityState::Modified, EntityState::Modified) if unchanged => None,
                    (_, next) => Some(next),
                };
                match next {
                    Some(next) => {
                        let change = &mut self.pending[index];
                        change.state = next;
                        change.document = document;
                        Ok(true)
                    }
                    None => {
                        self.pending.remove(index);
                        Ok(false)
                    }
                }
            }
        }
    }

    pub fn pending(&self) -> &[PendingChange] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of entities whose loaded state is being remembered
    pub fn tracked(&self) -> usize {
        self.snapshots.len()
    }

    /// The pending batch was written: fold it into the snapshots
    pub fn accept_changes(&mut self) {
        for change in self.pending.drain(..) {
            let id = (change.collection, change.key);
            match change.state {
                EntityState::Added | EntityState::Modified => {
                    self.snapshots.insert(id, change.document);
                }
                EntityState::Deleted => {
                    self.snapshots.remove(&id);
                }
            }
        }
    }

    /// Drop pending marks, keeping snapshots
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    /// Forget everything; snapshots may describe rolled-back state
    pub fn reset(&mut self) {
        self.pending.clear();
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::City;

    #[test]
    fn test_mark_records_in_order() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.mark(&City::new(2, "B", 10), EntityState::Added).unwrap());
        assert!(tracker.mark(&City::new(1, "A", 5), EntityState::Deleted).unwrap());

        let keys: Vec<&str> = tracker.pending().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["2", "1"]);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_add_then_update_stays_insert() {
        let mut tracker = ChangeTracker::new();
        tracker.mark(&City::new(1, "A", 5), EntityState::Added).unwrap();
        tracker.mark(&City::new(1, "A", 6), EntityState::Modified).unwrap();

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.pending()[0].state, EntityState::Added);
        assert_eq!(tracker.pending()[0].document["population"], 6);
    }

    #[test]
    fn test_add_then_remove_cancels() {
        let mut tracker = ChangeTracker::new();
        tracker.mark(&City::new(1, "A", 5), EntityState::Added).unwrap();
        assert!(!tracker.mark(&City::new(1, "A", 5), EntityState::Deleted).unwrap());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_remove_then_add_overwrites() {
        let mut tracker = ChangeTracker::new();
        tracker.mark(&City::new(1, "A", 5), EntityState::Deleted).unwrap();
        tracker.mark(&City::new(1, "A", 7), EntityState::Added).unwrap();
        assert_eq!(tracker.pending()[0].state, EntityState::Modified);
    }

    #[test]
    fn test_unchanged_tracked_update_is_dropped() {
        let mut tracker = ChangeTracker::new();
        let city = City::new(1, "A", 5);
        tracker.attach(&city).unwrap();
        assert_eq!(tracker.tracked(), 1);

        assert!(!tracker.mark(&city, EntityState::Modified).unwrap());
        assert!(tracker.is_empty());

        let changed = City::new(1, "A", 9);
        assert!(tracker.mark(&changed, EntityState::Modified).unwrap());
        // Reverting to the loaded state drops the pending update again
        assert!(!tracker.mark(&city, EntityState::Modified).unwrap());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_untracked_update_is_always_recorded() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.mark(&City::new(1, "A", 5), EntityState::Modified).unwrap());
    }

    #[test]
    fn test_accept_changes_updates_snapshots() {
        let mut tracker = ChangeTracker::new();
        tracker.attach(&City::new(3, "C", 1)).unwrap();
        tracker.mark(&City::new(1, "A", 5), EntityState::Added).unwrap();
        tracker.mark(&City::new(3, "C", 1), EntityState::Deleted).unwrap();
        tracker.accept_changes();

        assert!(tracker.is_empty());
        assert_eq!(tracker.tracked(), 1);
        // The inserted entity is now tracked, so an identical update is a no-op
        assert!(!tracker.mark(&City::new(1, "A", 5), EntityState::Modified).unwrap());
    }

    #[test]
    fn test_discard_and_reset() {
        let mut tracker = ChangeTracker::new();
        tracker.attach(&City::new(1, "A", 5)).unwrap();
        tracker.mark(&City::new(2, "B", 5), EntityState::Added).unwrap();

        tracker.discard();
        assert!(tracker.is_empty());
        assert_eq!(tracker.tracked(), 1);

        tracker.reset();
        assert_eq!(tracker.tracked(), 0);
    }
}
