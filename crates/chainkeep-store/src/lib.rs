//! Persistent, indexed block store with an orphan pool and chain
//! reorganization.
//!
//! [`BlockchainStore`] is the entry point: open it on a data directory, feed
//! it blocks with [`BlockchainStore::store`], and query the confirmed chain
//! through the `fetch_*` operations.

pub mod blockchain;
pub mod config;
pub mod index;
pub mod organizer;
pub mod orphans;
pub mod publisher;
pub mod records;
pub mod tables;

pub use blockchain::{BlockchainStore, Completion, StoreOutcome, StoreStatus};
pub use config::StoreConfig;
pub use index::BlockLocator;
pub use publisher::{ReorgEvent, ReorgSubscription};
pub use records::TxPosition;
