//! Lease-based leader election over a versioned key-value bucket.
//!
//! Any number of candidates contest a single key in a TTL-scoped bucket.
//! The candidate whose `create` succeeds is the leader and must keep
//! rewriting the key (compare-and-swap on its last revision) faster than
//! the TTL. Everyone else polls the key and retries the election once it
//! has disappeared. The store is the only shared state; candidates never
//! talk to each other.
//!
//! State changes are delivered, in order, on the channel returned by
//! [`Election::start`]. The channel closes right after the terminal
//! outcome (`Error`, `Cancelled` or `Stopped`).
//!
//! ## Example
//!
//! ```ignore
//! use skiff_election::{Election, ElectionConfig, Outcome};
//!
//! let config = ElectionConfig::for_ttl("resize-leader", store.ttl().unwrap());
//! let election = Election::new(store, config)?;
//! let mut outcomes = election.start(&shutdown)?;
//!
//! while let Some(outcome) = outcomes.recv().await {
//!     match outcome {
//!         Outcome::Won => resume_scaling(),
//!         Outcome::Lost => pause_scaling(),
//!         terminal => break,
//!     }
//! }
//! ```

mod config;
mod election;
mod error;
mod outcome;
pub mod pure;

pub use config::CandidateId;
pub use config::ElectionConfig;
pub use election::Election;
pub use election::OutcomeReceiver;
pub use error::ElectionError;
pub use outcome::Outcome;
pub use outcome::Status;
