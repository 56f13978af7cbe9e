//! Error types for versioned store operations.

use snafu::Snafu;

use crate::types::Revision;

/// Errors returned by a [`VersionedStore`](crate::VersionedStore).
///
/// `KeyNotFound`, `KeyExists` and `WrongRevision` are expected outcomes of
/// optimistic concurrency and are interpreted by callers as state. Everything
/// else means the store could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum KvError {
    /// No live entry exists for the key.
    #[snafu(display("key '{key}' not found"))]
    KeyNotFound {
        /// The requested key.
        key: String,
    },

    /// A live entry already exists for the key.
    #[snafu(display("key '{key}' already exists"))]
    KeyExists {
        /// The contested key.
        key: String,
    },

    /// The stored revision no longer matches the expected one.
    #[snafu(display("wrong revision for key '{key}': expected {expected}, actual {actual:?}"))]
    WrongRevision {
        /// The contested key.
        key: String,
        /// Revision the caller last observed.
        expected: Revision,
        /// Revision currently stored, if any.
        actual: Option<Revision>,
    },

    /// The store could not be reached.
    #[snafu(display("store unavailable: {reason}"))]
    Unavailable {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// The operation did not complete in time.
    #[snafu(display("operation timed out after {duration_ms}ms"))]
    Timeout {
        /// Time budget that elapsed.
        duration_ms: u64,
    },

    /// Any other store failure.
    #[snafu(display("operation failed: {reason}"))]
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl KvError {
    /// Returns true if the key had no live entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::KeyNotFound { .. })
    }

    /// Returns true if a create lost against an existing entry.
    pub fn is_key_exists(&self) -> bool {
        matches!(self, KvError::KeyExists { .. })
    }

    /// Returns true if a compare-and-swap lost against a concurrent change.
    ///
    /// Covers a newer writer, deletion and implicit TTL expiry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            KvError::KeyExists { .. } | KvError::WrongRevision { .. } | KvError::KeyNotFound { .. }
        )
    }
}
