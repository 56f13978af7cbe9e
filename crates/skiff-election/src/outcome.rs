//! Election outcomes.

use std::fmt;

use skiff_kv::KvError;

use crate::error::ElectionError;

/// A state change reported by a running election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// This candidate now holds the lease.
    Won,
    /// Another candidate holds the lease.
    Lost,
    /// The store failed; the election has shut down.
    Error(KvError),
    /// The context passed to `start` was cancelled.
    Cancelled,
    /// `stop` was called.
    Stopped,
}

/// The kind of an [`Outcome`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Won,
    Lost,
    Error,
    Cancelled,
    Stopped,
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Won => Status::Won,
            Outcome::Lost => Status::Lost,
            Outcome::Error(_) => Status::Error,
            Outcome::Cancelled => Status::Cancelled,
            Outcome::Stopped => Status::Stopped,
        }
    }

    /// Returns true if no outcome can follow this one.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// The error carried by `Error` and `Cancelled` outcomes.
    pub fn error(&self) -> Option<ElectionError> {
        match self {
            Outcome::Error(source) => Some(ElectionError::Store { source: source.clone() }),
            Outcome::Cancelled => Some(ElectionError::Cancelled),
            _ => None,
        }
    }
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Error | Status::Cancelled | Status::Stopped)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Won => "won",
            Status::Lost => "lost",
            Status::Error => "error",
            Status::Cancelled => "cancelled",
            Status::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Error(err) => write!(f, "error: {err}"),
            other => other.status().fmt(f),
        }
    }
}
