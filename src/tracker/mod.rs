//! Periodic trackers that refresh the KV store
//!
//! A tracker is a small writer that refreshes one slice of the key
//! namespace each cycle. The data server runs every enabled tracker on the
//! configured sleep cycle; a failing tracker logs and is retried next
//! cycle, it never takes the server down. Market-data fetchers beyond the
//! manual file are external collaborators that write the same `qv_{id}`
//! keys through the proxy.

mod balance;
mod chain_state;
mod dispute;
mod gas;
mod manual;

pub use balance::BalanceTracker;
pub use chain_state::ChainStateTracker;
pub use dispute::DisputeStatusTracker;
pub use gas::GasTracker;
pub use manual::ManualDataTracker;

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chain::Chain;
use crate::config::Config;
use crate::db::Store;
use crate::error::Result;

/// Fixed-point scale applied to oracle values before they enter the KV
pub const VALUE_GRANULARITY: u64 = 1_000_000;

/// A periodic KV writer
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Tracker name, matching the `trackers.names` config map
    fn name(&self) -> &'static str;

    /// Run one refresh cycle
    async fn poll(&self) -> Result<()>;
}

/// Build the trackers enabled in the configuration
pub fn enabled_trackers(
    cfg: &Config,
    store: Arc<Store>,
    chain: Arc<dyn Chain>,
    address: Address,
) -> Vec<Arc<dyn Tracker>> {
    let mut out: Vec<Arc<dyn Tracker>> = Vec::new();
    for (name, enabled) in &cfg.trackers.names {
        if !enabled {
            continue;
        }
        match name.as_str() {
            "currentVariables" => out.push(Arc::new(ChainStateTracker::new(
                store.clone(),
                chain.clone(),
            ))),
            "disputeStatus" => out.push(Arc::new(DisputeStatusTracker::new(
                store.clone(),
                chain.clone(),
                address,
            ))),
            "gas" => out.push(Arc::new(GasTracker::new(store.clone(), chain.clone()))),
            "balance" => out.push(Arc::new(BalanceTracker::new(
                store.clone(),
                chain.clone(),
                address,
            ))),
            "manualData" => out.push(Arc::new(ManualDataTracker::new(
                store.clone(),
                cfg.manual_data_file.clone(),
            ))),
            other => warn!(tracker = other, "unknown tracker name in config, ignoring"),
        }
    }
    out
}

/// Drives a set of trackers on a shared sleep cycle
pub struct TrackerRunner {
    trackers: Vec<Arc<dyn Tracker>>,
    sleep_cycle: Duration,
}

impl TrackerRunner {
    /// Create a runner over the given trackers
    pub fn new(trackers: Vec<Arc<dyn Tracker>>, sleep_cycle: Duration) -> Self {
        Self {
            trackers,
            sleep_cycle,
        }
    }

    /// Run every tracker once, returning the number of failures
    pub async fn run_cycle(&self) -> usize {
        let mut failures = 0;
        for tracker in &self.trackers {
            match tracker.poll().await {
                Ok(()) => debug!(tracker = tracker.name(), "tracker cycle complete"),
                Err(err) => {
                    failures += 1;
                    warn!(tracker = tracker.name(), %err, "tracker cycle failed, will retry next cycle");
                }
            }
        }
        failures
    }

    /// Run cycles until cancelled, signalling `ready` after the first fully
    /// successful cycle
    pub async fn run(self, cancel: CancellationToken, ready: watch::Sender<bool>) {
        loop {
            let failures = self.run_cycle().await;
            if failures == 0 {
                ready.send_replace(true);
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.sleep_cycle) => {}
            }
        }
    }
}
