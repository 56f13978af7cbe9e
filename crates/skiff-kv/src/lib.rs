//! Versioned, TTL-scoped key-value contract.
//!
//! Elections only need three primitives from their backing store, all
//! against a single bucket whose entries expire when not rewritten within
//! the bucket TTL:
//!
//! - `get` - read the live entry and its revision
//! - `create` - write only if no live entry exists
//! - `update` - compare-and-swap against the last observed revision
//!
//! [`InMemoryBucket`] implements the contract in-process. It backs local
//! mode and every test in the workspace.

mod error;
mod inmemory;
mod store;
mod types;

pub use error::KvError;
pub use inmemory::InMemoryBucket;
pub use store::VersionedStore;
pub use types::BucketConfig;
pub use types::Entry;
pub use types::Revision;
