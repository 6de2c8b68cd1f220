//! Tracker for the node gas price

use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::Chain;
use crate::db::{keys, Store};
use crate::error::Result;
use crate::tracker::Tracker;

/// Writes the node gas price in wei, hex encoded
pub struct GasTracker {
    store: Arc<Store>,
    chain: Arc<dyn Chain>,
}

impl GasTracker {
    /// Create the tracker
    pub fn new(store: Arc<Store>, chain: Arc<dyn Chain>) -> Self {
        Self { store, chain }
    }
}

#[async_trait]
impl Tracker for GasTracker {
    fn name(&self) -> &'static str {
        "gas"
    }

    async fn poll(&self) -> Result<()> {
        let price = self.chain.gas_price().await?;
        self.store
            .put(keys::GAS_PRICE, format!("{price:#x}").as_bytes())
    }
}
