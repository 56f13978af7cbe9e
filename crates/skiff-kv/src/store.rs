//! The versioned store trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::KvError;
use crate::types::Entry;
use crate::types::Revision;

/// A single TTL-scoped namespace with optimistic concurrency.
///
/// Implementations must make every operation atomic with respect to
/// concurrent callers. An entry that has not been written within the
/// bucket TTL must behave exactly as if it had been deleted.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Name of the bucket.
    fn bucket(&self) -> &str;

    /// TTL of the bucket, or `None` if entries never expire.
    fn ttl(&self) -> Option<Duration>;

    /// Read the live entry for `key`.
    ///
    /// Fails with [`KvError::KeyNotFound`] if there is none.
    async fn get(&self, key: &str) -> Result<Entry, KvError>;

    /// Write `value` only if no live entry exists for `key`.
    ///
    /// Fails with [`KvError::KeyExists`] otherwise.
    async fn create(&self, key: &str, value: &[u8]) -> Result<Revision, KvError>;

    /// Replace the entry for `key` if its revision is still `expected`.
    ///
    /// Fails with [`KvError::WrongRevision`] on a stale revision and
    /// [`KvError::KeyNotFound`] if the entry was deleted or expired.
    async fn update(&self, key: &str, value: &[u8], expected: Revision) -> Result<Revision, KvError>;

    /// Remove the entry for `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: VersionedStore + ?Sized> VersionedStore for std::sync::Arc<T> {
    fn bucket(&self) -> &str {
        (**self).bucket()
    }

    fn ttl(&self) -> Option<Duration> {
        (**self).ttl()
    }

    async fn get(&self, key: &str) -> Result<Entry, KvError> {
        (**self).get(key).await
    }

    async fn create(&self, key: &str, value: &[u8]) -> Result<Revision, KvError> {
        (**self).create(key, value).await
    }

    async fn update(&self, key: &str, value: &[u8], expected: Revision) -> Result<Revision, KvError> {
        (**self).update(key, value, expected).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        (**self).delete(key).await
    }
}
