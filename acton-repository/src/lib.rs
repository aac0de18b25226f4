//! # acton-repository
//!
//! Generic repository façade for persistent entities: composable filtering,
//! multi-key stable ordering, 1-indexed pagination, unit-of-work change
//! tracking and explicit transactions, over pluggable storage sessions.
//!
//! ## Features
//!
//! - **Query composition**: filter → multi-key sort → page, validated up front
//! - **Unit of work**: `add`/`update`/`remove` mark; `save` writes one atomic batch
//! - **Tracked and untracked reads**: unchanged tracked entities are never rewritten
//! - **Transactions**: commit rolls back automatically when its save fails
//! - **Cancellation**: cooperative, via `tokio_util::sync::CancellationToken`
//! - **Storage**: in-memory sessions, and SQLite through sqlx (feature `database`)
//! - **Configuration**: Figment (TOML + environment) and `tracing` setup
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_repository::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct City {
//!     id: i64,
//!     name: String,
//!     population: u64,
//! }
//!
//! impl Entity for City {
//!     type Key = i64;
//!     const COLLECTION: &'static str = "cities";
//!
//!     fn key(&self) -> i64 {
//!         self.id
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let database = config.database.clone().unwrap_or_default();
//!     let session = SqliteSession::connect(&database).await?;
//!     let mut cities = RepositoryFacade::<City, _>::with_config(session, &config.paging);
//!
//!     cities.begin_transaction().await?;
//!     cities.add(City { id: 1, name: "Lagos".into(), population: 15_000_000 })?;
//!     cities.commit().await?;
//!
//!     let page = cities
//!         .query_page(
//!             &QueryOptions::new()
//!                 .untracked()
//!                 .sort_by(|c: &City| c.population, OrderDirection::Descending)
//!                 .sort_by(|c| c.name.clone(), OrderDirection::Ascending)
//!                 .page(1, 10),
//!         )
//!         .await?;
//!     println!("{} of {} cities", page.len(), page.total);
//!
//!     shutdown_tracing();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod observability;
pub mod query;
pub mod repository;
pub mod storage;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, LogFormat, LoggingConfig, PagingConfig};
    pub use crate::entity::{Entity, EntityKey, Tracking};
    pub use crate::error::{Error, Result};
    pub use crate::observability::{init_tracing, shutdown_tracing};
    pub use crate::query::{
        Filter, OrderDirection, Page, PageRequest, Query, QueryComposer, QueryOptions, SortKey,
        SortSpec,
    };
    pub use crate::repository::{
        EntityRepository, RepositoryError, RepositoryErrorKind, RepositoryFacade,
        RepositoryOperation, RepositoryResult, TransactionHandle,
    };
    pub use crate::storage::{EntityState, MemorySession, MemoryStore, Session};

    #[cfg(feature = "database")]
    pub use crate::storage::SqliteSession;

    pub use tokio_util::sync::CancellationToken;
}
