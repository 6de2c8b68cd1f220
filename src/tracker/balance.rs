//! Tracker for the miner's token balance

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::chain::Chain;
use crate::db::{keys, Store};
use crate::error::Result;
use crate::tracker::Tracker;

/// Writes the miner's oracle token balance, hex encoded
pub struct BalanceTracker {
    store: Arc<Store>,
    chain: Arc<dyn Chain>,
    address: Address,
}

impl BalanceTracker {
    /// Create the tracker
    pub fn new(store: Arc<Store>, chain: Arc<dyn Chain>, address: Address) -> Self {
        Self {
            store,
            chain,
            address,
        }
    }
}

#[async_trait]
impl Tracker for BalanceTracker {
    fn name(&self) -> &'static str {
        "balance"
    }

    async fn poll(&self) -> Result<()> {
        let balance = self.chain.balance_of(self.address).await?;
        self.store
            .put(keys::BALANCE, format!("{balance:#x}").as_bytes())
    }
}
