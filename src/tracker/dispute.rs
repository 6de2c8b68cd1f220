//! Tracker for the miner's own dispute status

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::chain::Chain;
use crate::db::{keys, Store};
use crate::error::Result;
use crate::tracker::Tracker;

/// Writes the staker status of the configured miner address.
///
/// A status of 1 means staked and eligible; anything else stops the gate
/// from submitting, and the mine command refuses to start.
pub struct DisputeStatusTracker {
    store: Arc<Store>,
    chain: Arc<dyn Chain>,
    address: Address,
}

impl DisputeStatusTracker {
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
impl Tracker for DisputeStatusTracker {
    fn name(&self) -> &'static str {
        "disputeStatus"
    }

    async fn poll(&self) -> Result<()> {
        let info = self.chain.staker_info(self.address).await?;
        self.store.put(
            keys::DISPUTE_STATUS,
            format!("{:#x}", info.status).as_bytes(),
        )
    }
}
