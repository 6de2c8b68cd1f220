//! # Oracle Mining Client
//!
//! Mining client and data server for a decentralized price-oracle network.
//! Off-chain workers search for a proof-of-work nonce over the contract's
//! current challenge; the winner submits a batch of oracle values together
//! with the nonce. The data server keeps the price feeds and contract state
//! fresh in a local key–value store and answers signed requests from remote
//! miners.
//!
//! ## Architecture
//!
//! The miner is built around a small set of components wired together by
//! the [`mining::MiningManager`]: pluggable [`hashers`](hashers::Hasher)
//! fan out over a work item, a [`mining::WorkSource`] watches the chain for
//! challenge changes, and a [`mining::SubmissionGate`] holds solutions back
//! until the profitability and scheduling rules pass. KV access always goes
//! through a [`db::DataProxy`], so a local store and a remote data server
//! behind the signed HTTP protocol are interchangeable.

#![warn(rust_2018_idioms, unused_lifetimes, unused_qualifications, clippy::all)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod config;
pub mod core;
pub mod crypto;
pub mod db;
pub mod error;
pub mod hashers;
pub mod mining;
pub mod ops;
pub mod server;
pub mod tracker;
pub mod util;

pub use config::Config;
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::chain::{Chain, ContractClient};
    pub use crate::config::Config;
    pub use crate::core::{Candidate, ChainSnapshot, Challenge, WorkItem};
    pub use crate::db::{DataProxy, LocalProxy, RemoteProxy, Store};
    pub use crate::error::{Error, Result};
    pub use crate::hashers::Hasher;
    pub use crate::mining::{MinerDeps, MiningGroup, MiningManager, WorkSource};
    pub use crate::server::DataServerOps;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
