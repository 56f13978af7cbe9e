//! Error types for elections.

use skiff_kv::KvError;
use snafu::Snafu;

/// Errors from constructing, starting or running an election.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ElectionError {
    /// The election configuration is unusable.
    #[snafu(display("invalid election config: {reason}"))]
    InvalidConfig {
        /// What is wrong with it.
        reason: String,
    },

    /// The bucket never expires entries, so a dead leader would never be replaced.
    #[snafu(display("bucket '{bucket}' has no TTL"))]
    MissingTtl {
        /// The bucket name.
        bucket: String,
    },

    /// `start` was called on an election that already ran.
    #[snafu(display("election for '{key}' already started"))]
    AlreadyStarted {
        /// The contested key.
        key: String,
    },

    /// The caller's context was cancelled.
    #[snafu(display("election cancelled"))]
    Cancelled,

    /// The store failed in a way the election cannot interpret.
    #[snafu(display("store error: {source}"))]
    Store {
        /// The underlying error.
        source: KvError,
    },
}

impl From<KvError> for ElectionError {
    fn from(source: KvError) -> Self {
        ElectionError::Store { source }
    }
}
