//! Entity and key abstractions
//!
//! The façade is generic over any [`Entity`]: a serializable record with a
//! primary key. Sessions store entities as JSON documents grouped by
//! [`Entity::COLLECTION`] and addressed by [`EntityKey::storage_key`].
//!
//! # Example
//!
//! ```rust
//! use acton_repository::entity::Entity;
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
//! ```

use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// Primary-key types an entity may be identified by
pub trait EntityKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Render the key into the string form used by storage sessions
    fn storage_key(&self) -> String;
}

impl EntityKey for i32 {
    fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl EntityKey for i64 {
    fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl EntityKey for String {
    fn storage_key(&self) -> String {
        self.clone()
    }
}

impl EntityKey for Uuid {
    fn storage_key(&self) -> String {
        self.hyphenated().to_string()
    }
}

/// A persistable record managed through a repository façade
pub trait Entity:
    Clone + PartialEq + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Primary-key type
    type Key: EntityKey;

    /// Name of the storage collection (table) holding this entity type
    const COLLECTION: &'static str;

    /// The entity's primary key
    fn key(&self) -> Self::Key;
}

/// Whether entities returned by a read are registered with the unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tracking {
    /// Loaded state is snapshotted so later updates can be diffed
    #[default]
    Tracked,
    /// Read-only copies; nothing is remembered about them
    Untracked,
}

impl Tracking {
    /// Whether this mode registers entities with the unit of work
    pub const fn is_tracked(self) -> bool {
        matches!(self, Self::Tracked)
    }
}

impl fmt::Display for Tracking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tracked => write!(f, "tracked"),
            Self::Untracked => write!(f, "untracked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys() {
        assert_eq!(42_i32.storage_key(), "42");
        assert_eq!((-7_i64).storage_key(), "-7");
        assert_eq!("abc".to_string().storage_key(), "abc");

        let id = Uuid::nil();
        assert_eq!(id.storage_key(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_tracking_default_is_tracked() {
        assert_eq!(Tracking::default(), Tracking::Tracked);
        assert!(Tracking::Tracked.is_tracked());
        assert!(!Tracking::Untracked.is_tracked());
        assert_eq!(Tracking::Untracked.to_string(), "untracked");
    }
}
