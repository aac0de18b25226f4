//! Repository façade and its error model
//!
//! This module provides a generic repository for any [`Entity`](crate::entity::Entity),
//! layered over a storage [`Session`](crate::storage::Session).
//!
//! # Features
//!
//! - **Composable reads**: one `query` verb covers tracked/untracked, filtered,
//!   ordered and paged reads through [`QueryOptions`]
//! - **Unit of work**: `add`/`update`/`remove` only mark; `save` flushes one batch
//! - **Transactions**: `begin_transaction`/`commit`/`rollback`, with automatic
//!   rollback when a commit's save fails
//! - **Cancellation**: every storage call races a caller-supplied token
//! - **Structured errors**: [`RepositoryError`] carries the verb, a kind and
//!   entity context
//!
//! # Example
//!
//! ```rust,ignore
//! use acton_repository::prelude::*;
//!
//! let mut orders = RepositoryFacade::<Order, _>::new(store.session());
//! orders.begin_transaction().await?;
//! orders.add(order)?;
//! orders.update(invoice)?;
//! orders.commit().await?;
//! ```

mod error;
mod facade;
mod traits;

// Re-export all public types
pub use crate::query::QueryOptions;
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use facade::{RepositoryFacade, TransactionHandle};
pub use traits::{EntityRepository, RepositoryResult};
