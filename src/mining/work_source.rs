//! Work source: chain snapshots in, work generations out
//!
//! Polls the tracked chain snapshot on the heartbeat and emits a new work
//! item whenever the puzzle portion changes. Missing or stale snapshots
//! keep the source in `Polling`; it never emits synthetic work. The watch
//! channel means a slow consumer simply sees the newest generation.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{ChainSnapshot, WorkItem};
use crate::db::{keys, DataProxy};

/// Work source states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Created, not yet polling
    Idle,
    /// Polling without a fresh emittable snapshot
    Polling,
    /// Last poll emitted a new generation
    Emitting,
    /// Cancelled
    Stopped,
}

/// Polls the snapshot key and publishes work items
pub struct WorkSource {
    proxy: Arc<dyn DataProxy>,
    address: Address,
    heartbeat: Duration,
    tx: watch::Sender<Option<Arc<WorkItem>>>,
    state: SourceState,
    last: Option<ChainSnapshot>,
    generation: u64,
}

impl WorkSource {
    /// Create the source and its single-consumer work channel
    pub fn new(
        proxy: Arc<dyn DataProxy>,
        address: Address,
        heartbeat: Duration,
    ) -> (Self, watch::Receiver<Option<Arc<WorkItem>>>) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                proxy,
                address,
                heartbeat,
                tx,
                state: SourceState::Idle,
                last: None,
                generation: 0,
            },
            rx,
        )
    }

    /// Current state, visible to tests
    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Poll until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        self.state = SourceState::Polling;
        let mut ticker = tokio::time::interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.state = SourceState::Stopped;
                    debug!("work source stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.poll_once(crate::util::unix_now()).await;
                }
            }
        }
    }

    /// One poll step at an explicit `now`; emits when the puzzle changed
    pub(crate) async fn poll_once(&mut self, now: u64) {
        let raw = match self.proxy.get(keys::CURRENT_VARIABLES).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!("chain snapshot missing from KV, staying in polling state");
                self.state = SourceState::Polling;
                return;
            }
            Err(err) => {
                warn!(%err, "reading chain snapshot failed");
                self.state = SourceState::Polling;
                return;
            }
        };
        let snapshot: ChainSnapshot = match serde_json::from_slice(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, "chain snapshot is malformed");
                self.state = SourceState::Polling;
                return;
            }
        };
        if snapshot.is_stale(now, self.heartbeat) {
            warn!(
                updated_at = snapshot.updated_at,
                now, "chain snapshot is stale, not emitting work"
            );
            self.state = SourceState::Polling;
            return;
        }

        let changed = match &self.last {
            None => true,
            Some(last) => last.puzzle_changed(&snapshot),
        };
        if changed {
            self.generation += 1;
            let work = Arc::new(WorkItem::from_snapshot(
                &snapshot,
                self.address,
                self.generation,
            ));
            info!(
                generation = work.generation,
                challenge = %work.challenge,
                difficulty = %work.difficulty,
                request_ids = ?work.request_ids,
                "new challenge, emitting work"
            );
            self.tx.send_replace(Some(work));
            self.state = SourceState::Emitting;
        } else {
            self.state = SourceState::Polling;
        }
        // Ties in time are broken by preferring the newest snapshot.
        self.last = Some(snapshot);
    }
}
