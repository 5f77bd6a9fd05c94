//! Object storage seam
//!
//! The job machinery consumes storage through the narrow [`ObjectStore`] trait:
//! whole-object writes, existence checks, prefix listing, and a compose
//! primitive with a bounded fan-in. Two implementations ship with the crate:
//! - [`MemoryStore`] - process-local map, used by tests and demos
//! - [`LocalStore`] - objects as files under a root directory
//!
//! [`compose_many`] builds arbitrarily large composes out of the bounded primitive.

use crate::error::StorageError;
use async_trait::async_trait;
use std::time::Duration;

mod compose;
mod layout;
mod local;
mod memory;

pub use compose::compose_many;
pub use layout::JobLayout;
pub use local::LocalStore;
pub use memory::MemoryStore;

/// Fan-in limit of the compose primitive on common cloud object stores
pub const DEFAULT_COMPOSE_FAN_IN: usize = 32;

/// Storage result alias
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Capabilities the job machinery needs from an object store
///
/// Objects are immutable once written by the job machinery: parts and
/// headers are written exactly once, composes always target a fresh path.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, replacing any existing object at `path`
    async fn put(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()>;

    /// Read a whole object
    async fn get(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Whether an object exists at `path`
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Concatenate `sources` in order into `dest`
    ///
    /// Fails with [`StorageError::FanInExceeded`] when given more than
    /// [`max_compose_sources`](ObjectStore::max_compose_sources) sources.
    async fn compose(&self, sources: &[String], dest: &str) -> StorageResult<()>;

    /// Names of all objects whose path starts with `prefix`, sorted
    async fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Time-limited URL granting read access to `path`
    async fn signed_url(&self, path: &str, ttl: Duration) -> StorageResult<String>;

    /// Maximum number of sources a single compose call accepts
    fn max_compose_sources(&self) -> usize {
        DEFAULT_COMPOSE_FAN_IN
    }

    /// Implementation name for logs
    fn name(&self) -> &str;
}
