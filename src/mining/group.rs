//! Mining group: first valid solution wins
//!
//! Broadcasts one work item to every hasher with disjoint nonce starts,
//! waits for the first candidate that passes the predicate, then cancels
//! the siblings. A hasher error is retried once with a fresh seed;
//! persistent failure excludes the hasher, and the group only fails once
//! every hasher is gone.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::{Candidate, WorkItem};
use crate::error::{Error, Result};
use crate::hashers::{Hasher, SearchJob};

/// A fixed set of hashers working one item at a time
pub struct MiningGroup {
    hashers: Vec<Arc<dyn Hasher>>,
}

/// Wait for the remaining hasher tasks to acknowledge cancellation, so no
/// search from this work item outlives `mine`
async fn drain(done_rx: &mut mpsc::Receiver<(usize, Result<()>)>, mut alive: usize) {
    while alive > 0 {
        match done_rx.recv().await {
            Some(_) => alive -= 1,
            None => return,
        }
    }
}

impl MiningGroup {
    /// Create a group; at least one hasher is required
    pub fn new(hashers: Vec<Arc<dyn Hasher>>) -> Result<Self> {
        if hashers.is_empty() {
            return Err(Error::invalid_state("mining group needs at least one hasher"));
        }
        Ok(Self { hashers })
    }

    /// Number of hashers in the group
    pub fn size(&self) -> usize {
        self.hashers.len()
    }

    /// Aggregate hashrate across the group
    pub fn hashrate(&self) -> u64 {
        self.hashers.iter().map(|h| h.hashrate()).sum()
    }

    fn spawn_search(
        &self,
        id: usize,
        work: &Arc<WorkItem>,
        base: u64,
        found_tx: &mpsc::Sender<Candidate>,
        done_tx: &mpsc::Sender<(usize, Result<()>)>,
        cancel: &CancellationToken,
    ) {
        let hasher = Arc::clone(&self.hashers[id]);
        let job = SearchJob {
            work: Arc::clone(work),
            nonce_start: base.wrapping_add(id as u64),
            nonce_stride: self.hashers.len() as u64,
            hasher_id: id,
        };
        let found = found_tx.clone();
        let done = done_tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let result = hasher.search(job, found, token).await;
            let _ = done.send((id, result)).await;
        });
    }

    /// Mine one work item to its first valid candidate
    ///
    /// Returns `Ok(None)` when cancelled before a solution. The caller is
    /// responsible for discarding candidates of superseded generations.
    pub async fn mine(
        &self,
        work: Arc<WorkItem>,
        cancel: &CancellationToken,
    ) -> Result<Option<Candidate>> {
        let search_cancel = cancel.child_token();
        let capacity = self.hashers.len();
        let (found_tx, mut found_rx) = mpsc::channel::<Candidate>(capacity);
        let (done_tx, mut done_rx) = mpsc::channel::<(usize, Result<()>)>(capacity);

        let base: u64 = rand::random();
        for id in 0..self.hashers.len() {
            self.spawn_search(id, &work, base, &found_tx, &done_tx, &search_cancel);
        }

        let mut retried = vec![false; self.hashers.len()];
        let mut alive = self.hashers.len();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    search_cancel.cancel();
                    drain(&mut done_rx, alive).await;
                    return Ok(None);
                }
                Some(candidate) = found_rx.recv() => {
                    if work.accepts(&candidate.nonce) {
                        info!(
                            nonce = %candidate.nonce,
                            generation = candidate.generation,
                            hasher = candidate.hasher_id,
                            "solution found"
                        );
                        search_cancel.cancel();
                        drain(&mut done_rx, alive).await;
                        return Ok(Some(candidate));
                    }
                    warn!(
                        nonce = %candidate.nonce,
                        hasher = candidate.hasher_id,
                        "hasher reported a candidate that fails the predicate, dropping"
                    );
                }
                Some((id, result)) = done_rx.recv() => {
                    match result {
                        Ok(()) => {
                            alive -= 1;
                        }
                        Err(err) if !retried[id] => {
                            retried[id] = true;
                            warn!(hasher = %self.hashers[id].name(), %err, "hasher failed, retrying with fresh seed");
                            self.spawn_search(id, &work, rand::random(), &found_tx, &done_tx, &search_cancel);
                        }
                        Err(err) => {
                            alive -= 1;
                            error!(hasher = %self.hashers[id].name(), %err, "hasher failed twice, excluding from group");
                        }
                    }
                    if alive == 0 {
                        // A winner may have finished before its done event
                        // was processed; drain the candidate buffer first.
                        while let Ok(candidate) = found_rx.try_recv() {
                            if work.accepts(&candidate.nonce) {
                                return Ok(Some(candidate));
                            }
                        }
                        if search_cancel.is_cancelled() {
                            return Ok(None);
                        }
                        return Err(Error::hasher("group", "all hashers failed"));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Challenge;
    use crate::hashers::CpuHasher;
    use alloy_primitives::{Address, U256};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingHasher;

    #[async_trait]
    impl Hasher for FailingHasher {
        fn name(&self) -> String {
            "failing".to_string()
        }

        async fn search(
            &self,
            _job: SearchJob,
            _found: mpsc::Sender<Candidate>,
            _cancel: CancellationToken,
        ) -> Result<()> {
            Err(Error::hasher("failing", "broken device"))
        }

        fn hashrate(&self) -> u64 {
            0
        }
    }

    fn easy_work(generation: u64) -> Arc<WorkItem> {
        Arc::new(WorkItem {
            challenge: Challenge::from_bytes([1; 32]),
            difficulty: U256::from(4u64),
            request_ids: vec![1],
            address: Address::from_slice(&[2; 20]),
            generation,
        })
    }

    fn hard_work() -> Arc<WorkItem> {
        Arc::new(WorkItem {
            challenge: Challenge::from_bytes([1; 32]),
            difficulty: U256::MAX,
            request_ids: vec![1],
            address: Address::from_slice(&[2; 20]),
            generation: 0,
        })
    }

    #[tokio::test]
    async fn test_group_finds_valid_candidate() {
        let group = MiningGroup::new(vec![
            Arc::new(CpuHasher::new(0)),
            Arc::new(CpuHasher::new(1)),
        ])
        .unwrap();
        let work = easy_work(5);
        let cancel = CancellationToken::new();
        let candidate = group
            .mine(Arc::clone(&work), &cancel)
            .await
            .unwrap()
            .expect("solution");
        assert_eq!(candidate.generation, 5);
        assert!(work.accepts(&candidate.nonce));
    }

    #[tokio::test]
    async fn test_group_cancellation_returns_none() {
        let group = MiningGroup::new(vec![Arc::new(CpuHasher::new(0))]).unwrap();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { group.mine(hard_work(), &token).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("group stopped")
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_all_hashers_failing_is_fatal() {
        let group =
            MiningGroup::new(vec![Arc::new(FailingHasher), Arc::new(FailingHasher)]).unwrap();
        let cancel = CancellationToken::new();
        let result = group.mine(hard_work(), &cancel).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_group_survives_one_broken_hasher() {
        let group = MiningGroup::new(vec![
            Arc::new(FailingHasher) as Arc<dyn Hasher>,
            Arc::new(CpuHasher::new(1)),
        ])
        .unwrap();
        let work = easy_work(1);
        let cancel = CancellationToken::new();
        let candidate = group.mine(Arc::clone(&work), &cancel).await.unwrap();
        assert!(candidate.is_some());
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(MiningGroup::new(Vec::new()).is_err());
    }
}
