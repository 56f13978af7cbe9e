//! Pure election transitions.
//!
//! Each function maps the result of one store call to the next phase and
//! the outcome to report, if any. The driver in [`crate::Election`] owns
//! all I/O and timing; everything here is deterministic.
//!
//! ```text
//! Electing --create ok-------------> Winner   (emit Won)
//! Electing --create KeyExists------> Loser    (emit Lost)
//! Winner   --update ok-------------> Winner
//! Winner   --update conflict-------> Loser    (emit Lost)
//! Loser    --get ok----------------> Loser
//! Loser    --get KeyNotFound-------> Electing
//! any      --other store error-----> finish   (emit Error)
//! ```

use skiff_kv::Entry;
use skiff_kv::KvError;
use skiff_kv::Revision;

use crate::outcome::Outcome;

/// Where the election loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// About to attempt `create`.
    Electing,
    /// Holding the lease at `revision`.
    Winner { revision: Revision },
    /// Waiting for the lease to disappear.
    Loser,
}

impl Phase {
    /// Returns true if `other` is the same phase, ignoring the held revision.
    pub fn same_kind(&self, other: &Phase) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// The result of applying one store result to the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Continue in `phase`, reporting `outcome` first if present.
    Enter { phase: Phase, outcome: Option<Outcome> },
    /// Shut down after reporting the terminal outcome.
    Finish(Outcome),
}

/// Transition after a `create` attempt.
#[inline]
pub fn on_create(result: Result<Revision, KvError>) -> Step {
    match result {
        Ok(revision) => Step::Enter {
            phase: Phase::Winner { revision },
            outcome: Some(Outcome::Won),
        },
        Err(e) if e.is_key_exists() => Step::Enter {
            phase: Phase::Loser,
            outcome: Some(Outcome::Lost),
        },
        Err(e) => Step::Finish(Outcome::Error(e)),
    }
}

/// Transition after a leader's compare-and-swap renewal.
#[inline]
pub fn on_renew(result: Result<Revision, KvError>) -> Step {
    match result {
        Ok(revision) => Step::Enter {
            phase: Phase::Winner { revision },
            outcome: None,
        },
        Err(e) if e.is_conflict() => Step::Enter {
            phase: Phase::Loser,
            outcome: Some(Outcome::Lost),
        },
        Err(e) => Step::Finish(Outcome::Error(e)),
    }
}

/// Transition after a follower's poll.
#[inline]
pub fn on_poll(result: Result<Entry, KvError>) -> Step {
    match result {
        Ok(_) => Step::Enter {
            phase: Phase::Loser,
            outcome: None,
        },
        Err(e) if e.is_not_found() => Step::Enter {
            phase: Phase::Electing,
            outcome: None,
        },
        Err(e) => Step::Finish(Outcome::Error(e)),
    }
}
