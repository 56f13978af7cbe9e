//! In-process TTL bucket.
//!
//! Entries expire lazily: every operation first drops the entry it touches
//! if its last write is older than the bucket TTL, so an expired entry is
//! indistinguishable from a deleted one. Time is read from
//! [`tokio::time::Instant`], which lets tests drive expiry on a paused clock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::error::KvError;
use crate::store::VersionedStore;
use crate::types::BucketConfig;
use crate::types::Entry;
use crate::types::Revision;

/// Stored value with the bookkeeping needed for CAS and expiry.
#[derive(Clone)]
struct VersionedValue {
    value: Vec<u8>,
    revision: Revision,
    written_at: Instant,
}

#[derive(Default)]
struct BucketState {
    entries: BTreeMap<String, VersionedValue>,
    /// Last revision handed out. Shared by all keys in the bucket.
    revision: Revision,
    /// One-shot failure returned by the next operation.
    injected: Option<KvError>,
}

/// A TTL-scoped, in-memory [`VersionedStore`].
///
/// Revisions increase by exactly one per successful `create` or `update`
/// across the whole bucket.
pub struct InMemoryBucket {
    config: BucketConfig,
    state: Mutex<BucketState>,
}

impl InMemoryBucket {
    /// Create a new bucket wrapped in Arc.
    pub fn new(config: BucketConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(BucketState::default()),
        })
    }

    /// Make the next operation on this bucket fail with `error`.
    pub async fn fail_next(&self, error: KvError) {
        self.state.lock().await.injected = Some(error);
    }

    /// Last revision assigned by this bucket.
    pub async fn current_revision(&self) -> Revision {
        self.state.lock().await.revision
    }

    fn is_expired(&self, value: &VersionedValue, now: Instant) -> bool {
        match self.config.effective_ttl() {
            Some(ttl) => now.saturating_duration_since(value.written_at) >= ttl,
            None => false,
        }
    }

    /// Take the injected failure, then purge `key` if it has expired.
    fn prepare(&self, state: &mut BucketState, key: &str) -> Result<(), KvError> {
        if let Some(error) = state.injected.take() {
            return Err(error);
        }
        let now = Instant::now();
        let expired = state.entries.get(key).is_some_and(|v| self.is_expired(v, now));
        if expired {
            trace!(bucket = %self.config.name, key, "entry expired");
            state.entries.remove(key);
        }
        Ok(())
    }

    fn write(state: &mut BucketState, key: &str, value: &[u8]) -> Revision {
        state.revision = state.revision.next();
        state.entries.insert(key.to_string(), VersionedValue {
            value: value.to_vec(),
            revision: state.revision,
            written_at: Instant::now(),
        });
        state.revision
    }
}

#[async_trait]
impl VersionedStore for InMemoryBucket {
    fn bucket(&self) -> &str {
        &self.config.name
    }

    fn ttl(&self) -> Option<Duration> {
        self.config.effective_ttl()
    }

    async fn get(&self, key: &str) -> Result<Entry, KvError> {
        let mut state = self.state.lock().await;
        self.prepare(&mut state, key)?;
        match state.entries.get(key) {
            Some(v) => Ok(Entry {
                key: key.to_string(),
                value: v.value.clone(),
                revision: v.revision,
            }),
            None => Err(KvError::KeyNotFound { key: key.to_string() }),
        }
    }

    async fn create(&self, key: &str, value: &[u8]) -> Result<Revision, KvError> {
        let mut state = self.state.lock().await;
        self.prepare(&mut state, key)?;
        if state.entries.contains_key(key) {
            return Err(KvError::KeyExists { key: key.to_string() });
        }
        Ok(Self::write(&mut state, key, value))
    }

    async fn update(&self, key: &str, value: &[u8], expected: Revision) -> Result<Revision, KvError> {
        let mut state = self.state.lock().await;
        self.prepare(&mut state, key)?;
        match state.entries.get(key).map(|v| v.revision) {
            None => Err(KvError::KeyNotFound { key: key.to_string() }),
            Some(actual) if actual != expected => Err(KvError::WrongRevision {
                key: key.to_string(),
                expected,
                actual: Some(actual),
            }),
            Some(_) => Ok(Self::write(&mut state, key, value)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut state = self.state.lock().await;
        self.prepare(&mut state, key)?;
        state.entries.remove(key);
        Ok(())
    }
}
