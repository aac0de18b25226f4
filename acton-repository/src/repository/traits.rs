//! Repository trait definitions
//!
//! [`EntityRepository`] is the capability surface of a repository for one
//! entity type. It uses RPITIT (Return Position Impl Trait In Traits), so
//! implementations write plain `async fn` without `async_trait`.
//!
//! Hosts that register repositories in a container, or want to swap the
//! façade for a test double, depend on this trait instead of on
//! [`RepositoryFacade`] directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use acton_repository::prelude::*;
//!
//! async fn rename<R: EntityRepository<City>>(repo: &mut R, id: i64, name: &str) -> RepositoryResult<bool> {
//!     let Some(mut city) = repo.get_by_id(&id).await? else {
//!         return Ok(false);
//!     };
//!     city.name = name.to_string();
//!     repo.update(city)?;
//!     repo.save().await?;
//!     Ok(true)
//! }
//! ```

use std::future::Future;

use crate::entity::Entity;
use crate::query::{Filter, Page, QueryOptions};
use crate::storage::Session;

use super::error::RepositoryError;
use super::facade::{RepositoryFacade, TransactionHandle};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Reads, change marking and unit-of-work control for one entity type
pub trait EntityRepository<T: Entity>: Send {
    /// All entities matching `options`
    fn query(
        &mut self,
        options: &QueryOptions<T>,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// One page of entities plus the total across pages
    fn query_page(
        &mut self,
        options: &QueryOptions<T>,
    ) -> impl Future<Output = RepositoryResult<Page<T>>> + Send;

    /// Look up an entity by primary key
    ///
    /// Returns `Ok(None)` if no entity has the key.
    fn get_by_id(
        &mut self,
        key: &T::Key,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// First entity of the composed query
    fn first(
        &mut self,
        options: &QueryOptions<T>,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Number of entities, optionally matching `filter`
    fn count(
        &mut self,
        filter: Option<&Filter<T>>,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Whether any entity exists, optionally matching `filter`
    fn any(
        &mut self,
        filter: Option<&Filter<T>>,
    ) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Mark an entity for insertion
    fn add(&mut self, entity: T) -> RepositoryResult<T>;

    /// Mark an entity for modification
    fn update(&mut self, entity: T) -> RepositoryResult<T>;

    /// Mark an entity for deletion
    fn remove(&mut self, entity: &T) -> RepositoryResult<()>;

    /// Write pending marks; returns the records written
    fn save(&mut self) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Open a transaction around subsequent saves
    fn begin_transaction(
        &mut self,
    ) -> impl Future<Output = RepositoryResult<TransactionHandle>> + Send;

    /// Save and commit
    fn commit(&mut self) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Discard the transaction and pending marks
    fn rollback(&mut self) -> impl Future<Output = RepositoryResult<()>> + Send;
}

impl<T: Entity, S: Session> EntityRepository<T> for RepositoryFacade<T, S> {
    async fn query(&mut self, options: &QueryOptions<T>) -> RepositoryResult<Vec<T>> {
        RepositoryFacade::query(self, options).await
    }

    async fn query_page(&mut self, options: &QueryOptions<T>) -> RepositoryResult<Page<T>> {
        RepositoryFacade::query_page(self, options).await
    }

    async fn get_by_id(&mut self, key: &T::Key) -> RepositoryResult<Option<T>> {
        RepositoryFacade::get_by_id(self, key).await
    }

    async fn first(&mut self, options: &QueryOptions<T>) -> RepositoryResult<Option<T>> {
        RepositoryFacade::first(self, options).await
    }

    async fn count(&mut self, filter: Option<&Filter<T>>) -> RepositoryResult<u64> {
        self.count_wide(filter).await
    }

    async fn any(&mut self, filter: Option<&Filter<T>>) -> RepositoryResult<bool> {
        RepositoryFacade::any(self, filter).await
    }

    fn add(&mut self, entity: T) -> RepositoryResult<T> {
        RepositoryFacade::add(self, entity)
    }

    fn update(&mut self, entity: T) -> RepositoryResult<T> {
        RepositoryFacade::update(self, entity)
    }

    fn remove(&mut self, entity: &T) -> RepositoryResult<()> {
        RepositoryFacade::remove(self, entity)
    }

    async fn save(&mut self) -> RepositoryResult<u64> {
        RepositoryFacade::save(self).await
    }

    async fn begin_transaction(&mut self) -> RepositoryResult<TransactionHandle> {
        RepositoryFacade::begin_transaction(self).await
    }

    async fn commit(&mut self) -> RepositoryResult<u64> {
        RepositoryFacade::commit(self).await
    }

    async fn rollback(&mut self) -> RepositoryResult<()> {
        RepositoryFacade::rollback(self).await
    }
}
