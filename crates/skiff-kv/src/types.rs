//! Shared types for versioned store operations.

use std::fmt;
use std::time::Duration;

/// Store-assigned version of an entry, used for compare-and-swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

impl Revision {
    /// Create a revision from its raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw revision value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The revision following this one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live entry read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Key of the entry.
    pub key: String,
    /// Opaque value bytes.
    pub value: Vec<u8>,
    /// Revision assigned by the last successful write.
    pub revision: Revision,
}

/// Configuration of a TTL-scoped bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    /// Bucket name.
    pub name: String,
    /// Entries not rewritten within this window disappear.
    /// A zero TTL means entries never expire.
    pub ttl: Duration,
}

impl BucketConfig {
    /// Create a bucket configuration.
    pub fn new(name: impl Into<String>, ttl: Duration) -> Self {
        Self { name: name.into(), ttl }
    }

    /// The effective TTL, or `None` if entries never expire.
    pub fn effective_ttl(&self) -> Option<Duration> {
        if self.ttl.is_zero() { None } else { Some(self.ttl) }
    }
}
