//! Mining manager: the top-level reactor
//!
//! Wires the work source, the mining group and the submission gate under a
//! single cancellation tree. At most one solver runs per generation; a
//! superseded generation's solver is cancelled before the next one starts
//! and its candidates are dropped unconditionally. Shutdown cancels the
//! solver and drains the gate before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::Chain;
use crate::core::{Candidate, WorkItem};
use crate::db::DataProxy;
use crate::error::Result;
use crate::mining::submitter::{GateConfig, SubmissionGate, SubmitOutcome};
use crate::mining::MiningGroup;

/// How often the aggregate hashrate is logged
const HASHRATE_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Explicit dependencies injected into the manager and its children
pub struct MinerDeps {
    /// KV handle, local or remote
    pub proxy: Arc<dyn DataProxy>,
    /// Chain client
    pub chain: Arc<dyn Chain>,
    /// Miner public address
    pub address: Address,
    /// Gate tuning
    pub gate: GateConfig,
}

/// The top-level mining reactor
pub struct MiningManager {
    group: Arc<MiningGroup>,
    gate: Arc<SubmissionGate>,
    work_rx: watch::Receiver<Option<Arc<WorkItem>>>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl MiningManager {
    /// Assemble the manager; the gate is constructed from the injected deps
    pub fn new(
        deps: MinerDeps,
        group: MiningGroup,
        work_rx: watch::Receiver<Option<Arc<WorkItem>>>,
        cancel: CancellationToken,
    ) -> Self {
        let gate = Arc::new(SubmissionGate::new(
            deps.proxy,
            deps.chain,
            deps.address,
            deps.gate,
        ));
        Self {
            group: Arc::new(group),
            gate,
            work_rx,
            cancel,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that tracks whether the reactor loop is alive
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the reactor until cancelled or a fatal error surfaces
    pub async fn run(self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!(hashers = self.group.size(), "mining manager started");
        let running = Arc::clone(&self.running);
        let result = self.event_loop().await;
        running.store(false, Ordering::SeqCst);
        if let Err(err) = &result {
            error!(%err, "mining manager exited with error");
        }
        result
    }

    async fn event_loop(mut self) -> Result<()> {
        type Solved = (Arc<WorkItem>, Result<Option<Candidate>>);
        let (solved_tx, mut solved_rx) = mpsc::channel::<Solved>(1);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<Result<SubmitOutcome>>(1);

        // (generation, solver cancel token, solver task)
        let mut solver: Option<(u64, CancellationToken, JoinHandle<()>)> = None;
        // (generation, gate cancel token, gate task)
        let mut gate_task: Option<(u64, CancellationToken, JoinHandle<()>)> = None;
        let mut hashrate_ticker = tokio::time::interval(HASHRATE_LOG_INTERVAL);
        hashrate_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                changed = self.work_rx.changed() => {
                    if changed.is_err() {
                        warn!("work source channel closed");
                        break;
                    }
                    let Some(work) = self.work_rx.borrow_and_update().clone() else {
                        continue;
                    };
                    // The superseded solver is cancelled and joined before
                    // any hasher starts on the new work. Anything still in
                    // the result channel predates the new generation and is
                    // dropped unconditionally; draining also keeps the
                    // channel slot free so the join cannot wedge.
                    while let Ok((stale_work, _)) = solved_rx.try_recv() {
                        debug!(
                            generation = stale_work.generation,
                            "dropping result of superseded generation"
                        );
                    }
                    if let Some((generation, token, handle)) = solver.take() {
                        debug!(generation, "cancelling superseded solver");
                        token.cancel();
                        let _ = handle.await;
                    }
                    // A deferral for an older generation can never submit now.
                    if let Some((generation, token, handle)) = gate_task.take() {
                        if generation < work.generation {
                            debug!(generation, "discarding deferred candidate of older generation");
                            token.cancel();
                            let _ = handle.await;
                        } else {
                            gate_task = Some((generation, token, handle));
                        }
                    }
                    let token = self.cancel.child_token();
                    let group = Arc::clone(&self.group);
                    let tx = solved_tx.clone();
                    let solver_token = token.clone();
                    let generation = work.generation;
                    let handle = tokio::spawn(async move {
                        let result = group.mine(Arc::clone(&work), &token).await;
                        let _ = tx.send((work, result)).await;
                    });
                    solver = Some((generation, solver_token, handle));
                }

                Some((work, result)) = solved_rx.recv() => {
                    match result {
                        Ok(Some(candidate)) => {
                            let current = solver.as_ref().map(|(generation, _, _)| *generation);
                            if current != Some(candidate.generation) {
                                debug!(
                                    generation = candidate.generation,
                                    "dropping candidate of superseded generation"
                                );
                                continue;
                            }
                            solver = None;
                            let token = self.cancel.child_token();
                            let gate = Arc::clone(&self.gate);
                            let tx = outcome_tx.clone();
                            let generation = candidate.generation;
                            let spawn_token = token.clone();
                            let handle = tokio::spawn(async move {
                                let outcome = gate.process(&work, candidate, &spawn_token).await;
                                let _ = tx.send(outcome).await;
                            });
                            gate_task = Some((generation, token, handle));
                        }
                        Ok(None) => {
                            // Solver was cancelled; a newer generation owns
                            // the hashers now.
                        }
                        Err(err) => return Err(err),
                    }
                }

                Some(outcome) = outcome_rx.recv() => {
                    gate_task = None;
                    match outcome {
                        Ok(SubmitOutcome::Submitted { tx, nonce }) => {
                            info!(%tx, nonce = %nonce, "submission confirmed by node");
                        }
                        Ok(SubmitOutcome::Discarded) => {
                            debug!("deferred candidate discarded");
                        }
                        Ok(SubmitOutcome::Cancelled) => {}
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => warn!(%err, "submission failed"),
                    }
                }

                _ = hashrate_ticker.tick() => {
                    let rate = self.group.hashrate();
                    if rate > 0 {
                        info!(hashrate = rate, "aggregate hashrate");
                    }
                }
            }
        }

        // Shutdown: cancel the solver, drain the gate.
        while solved_rx.try_recv().is_ok() {}
        if let Some((_, token, handle)) = solver.take() {
            token.cancel();
            let _ = handle.await;
        }
        if let Some((_, token, handle)) = gate_task.take() {
            token.cancel();
            let _ = handle.await;
        }
        info!("mining manager stopped");
        Ok(())
    }
}
