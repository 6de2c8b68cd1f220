//! Key–value access for the miner and data server
//!
//! The embedded store holds oracle values, chain snapshots and per-miner
//! scratch data. Components never touch the store directly; they go through
//! the [`DataProxy`] abstraction so a local store and a remote data server
//! are indistinguishable to the mining side.

pub mod codec;
pub mod local;
pub mod remote;
mod store;

pub use local::LocalProxy;
pub use remote::RemoteProxy;
pub use store::Store;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// Uniform KV handle used by the miner
///
/// `batch_get` must observe a consistent view across the batch; `batch_put`
/// must appear atomic to concurrent readers (the remote implementation
/// relies on the server's write lock for this).
#[async_trait]
pub trait DataProxy: Send + Sync {
    /// Read one key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write one key
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Read a batch of keys; missing keys are absent from the result map
    async fn batch_get(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>>;

    /// Write a batch of key/value pairs
    async fn batch_put(&self, keys: &[String], values: &[Vec<u8>]) -> Result<()>;
}

/// The KV key namespace
///
/// Three classes of keys exist: oracle values (`qv_{id}`), chain snapshot
/// keys written by the trackers, and per-miner scratch keys prefixed with
/// the miner's public address.
pub mod keys {
    use alloy_primitives::Address;

    use crate::crypto::address_hex;

    /// JSON chain snapshot polled by the work source
    pub const CURRENT_VARIABLES: &str = "current_variables";
    /// Dispute status of the configured miner address; "0x1" means eligible
    pub const DISPUTE_STATUS: &str = "dispute_status";
    /// Node gas price in wei, hex encoded
    pub const GAS_PRICE: &str = "gas_price";
    /// Next miner slot to be filled for the current challenge
    pub const SLOT_INDEX: &str = "slot_index";
    /// Current mining reward, hex encoded
    pub const MINING_REWARD: &str = "mining_reward";
    /// Unix seconds of the last value accepted by the contract
    pub const LAST_SUBMIT: &str = "last_submit";
    /// Miner token balance, hex encoded
    pub const BALANCE: &str = "balance";

    const SNAPSHOT_KEYS: &[&str] = &[
        CURRENT_VARIABLES,
        DISPUTE_STATUS,
        GAS_PRICE,
        SLOT_INDEX,
        MINING_REWARD,
        LAST_SUBMIT,
        BALANCE,
    ];

    /// Key holding the tracked value for one oracle request id
    pub fn oracle_value(request_id: u64) -> String {
        format!("qv_{request_id}")
    }

    /// Scratch key owned by a miner address
    pub fn scratch(address: Address, suffix: &str) -> String {
        format!("{}-{}", address_hex(address), suffix)
    }

    /// Scratch key recording the miner's own last submission time
    pub fn last_submit_for(address: Address) -> String {
        scratch(address, LAST_SUBMIT)
    }

    /// True when `key` starts with the address prefix of any whitelisted miner
    pub fn has_whitelisted_prefix(key: &str, whitelist: &[Address]) -> bool {
        whitelist
            .iter()
            .any(|addr| key.starts_with(&address_hex(*addr)))
    }

    /// Static allow-list for proxied reads: snapshot keys, oracle values and
    /// scratch keys belonging to whitelisted miners
    pub fn is_known_key(key: &str, whitelist: &[Address]) -> bool {
        if SNAPSHOT_KEYS.contains(&key) {
            return true;
        }
        if let Some(id) = key.strip_prefix("qv_") {
            return !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit());
        }
        has_whitelisted_prefix(key, whitelist)
    }

}
