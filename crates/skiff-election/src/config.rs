//! Election configuration.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::error::ElectionError;

/// Identifies one candidate for the lifetime of an election.
///
/// Written as the value of the lease record. Must not be shared between
/// candidates contesting the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for one election.
///
/// Both intervals must be strictly shorter than the bucket TTL: a leader
/// renewing slower than the TTL evicts itself, and a follower polling slower
/// than the TTL leaves the key vacant for longer than necessary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionConfig {
    /// The contested key.
    pub key: String,
    /// Value written to the key by this candidate.
    pub candidate_id: CandidateId,
    /// How often the leader rewrites the key.
    pub update_interval_ms: u64,
    /// How often a follower checks whether the key has disappeared.
    pub poll_interval_ms: u64,
    /// Upper bound for each store call. `None` leaves calls unbounded.
    pub op_timeout_ms: Option<u64>,
}

impl ElectionConfig {
    /// Leader renews at 3/4 of the TTL.
    pub const UPDATE_RATIO: (u64, u64) = (3, 4);
    /// Followers poll at 1/4 of the TTL.
    pub const POLL_RATIO: (u64, u64) = (1, 4);

    /// Derive intervals from the bucket TTL, with a fresh candidate ID.
    pub fn for_ttl(key: impl Into<String>, ttl: Duration) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let scale = |(num, den): (u64, u64)| (ttl_ms.saturating_mul(num) / den).max(1);
        Self {
            key: key.into(),
            candidate_id: CandidateId::generate(),
            update_interval_ms: scale(Self::UPDATE_RATIO),
            poll_interval_ms: scale(Self::POLL_RATIO),
            op_timeout_ms: None,
        }
    }

    pub fn with_candidate_id(mut self, candidate_id: CandidateId) -> Self {
        self.candidate_id = candidate_id;
        self
    }

    pub fn with_op_timeout_ms(mut self, op_timeout_ms: u64) -> Self {
        self.op_timeout_ms = Some(op_timeout_ms);
        self
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn op_timeout(&self) -> Option<Duration> {
        self.op_timeout_ms.map(Duration::from_millis)
    }

    /// Check the configuration against the bucket TTL.
    pub fn validate(&self, ttl: Duration) -> Result<(), ElectionError> {
        let invalid = |reason: String| Err(ElectionError::InvalidConfig { reason });

        if self.key.is_empty() {
            return invalid("key must not be empty".into());
        }
        if self.candidate_id.as_str().is_empty() {
            return invalid("candidate id must not be empty".into());
        }
        if self.update_interval_ms == 0 || self.poll_interval_ms == 0 {
            return invalid("intervals must be positive".into());
        }
        if self.update_interval() >= ttl {
            return invalid(format!(
                "update interval {}ms must be shorter than TTL {}ms",
                self.update_interval_ms,
                ttl.as_millis()
            ));
        }
        if self.poll_interval() >= ttl {
            return invalid(format!(
                "poll interval {}ms must be shorter than TTL {}ms",
                self.poll_interval_ms,
                ttl.as_millis()
            ));
        }
        if self.op_timeout_ms == Some(0) {
            return invalid("op timeout must be positive".into());
        }
        Ok(())
    }
}
