//! Tracker for the contract's current puzzle state

use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::Chain;
use crate::core::ChainSnapshot;
use crate::db::{keys, Store};
use crate::error::Result;
use crate::tracker::Tracker;
use crate::util;

/// Writes the `current_variables` snapshot plus the derived scalar keys the
/// submission gate reads individually
pub struct ChainStateTracker {
    store: Arc<Store>,
    chain: Arc<dyn Chain>,
}

impl ChainStateTracker {
    /// Create the tracker
    pub fn new(store: Arc<Store>, chain: Arc<dyn Chain>) -> Self {
        Self { store, chain }
    }
}

#[async_trait]
impl Tracker for ChainStateTracker {
    fn name(&self) -> &'static str {
        "currentVariables"
    }

    async fn poll(&self) -> Result<()> {
        let vars = self.chain.current_variables().await?;
        let last_value_time = self.chain.last_new_value_time().await?;

        let snapshot = ChainSnapshot {
            challenge: vars.challenge,
            difficulty: vars.difficulty,
            request_ids: vars.request_ids,
            reward: vars.reward,
            slot_index: vars.slot_index,
            ordered_fill: vars.ordered_fill,
            updated_at: util::unix_now(),
        };

        let kv_keys = vec![
            keys::CURRENT_VARIABLES.to_string(),
            keys::SLOT_INDEX.to_string(),
            keys::MINING_REWARD.to_string(),
            keys::LAST_SUBMIT.to_string(),
        ];
        let kv_values = vec![
            serde_json::to_vec(&snapshot)?,
            snapshot.slot_index.to_string().into_bytes(),
            format!("{:#x}", snapshot.reward).into_bytes(),
            last_value_time.to_string().into_bytes(),
        ];
        self.store.batch_put(&kv_keys, &kv_values)
    }
}
