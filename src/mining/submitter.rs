//! Submission gate: profitability and fairness checks
//!
//! A candidate only reaches the chain after the gate rules pass, evaluated
//! in order: dispute status, minimum submit period, slot eligibility,
//! profitability, value materialization. A failing rule defers the
//! candidate and re-evaluates on the interrupt interval; a challenge change
//! mid-deferral discards it. Oracle values are read at submit time, not at
//! solve time, so a deferred candidate always ships fresh values.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256, U256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{apply_gas_policy, Chain};
use crate::core::constants::{MAX_REQUEST_IDS, SLOT_COUNT, SUBMIT_GAS};
use crate::core::{Candidate, ChainSnapshot, Challenge, WorkItem};
use crate::db::{keys, DataProxy};
use crate::error::{Error, Result};
use crate::util;

/// Attempts before a rejected submission is surfaced
const MAX_SUBMIT_ATTEMPTS: u32 = 3;

/// Gas bump per retry, in percent of the previous price
const GAS_BUMP_PERCENT: u64 = 110;

/// Outcome of pushing one candidate through the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The solution was accepted by the node
    Submitted {
        /// Transaction hash
        tx: B256,
        /// Submitted nonce
        nonce: String,
    },
    /// The challenge changed while the candidate was deferred
    Discarded,
    /// Shutdown arrived while the candidate was deferred
    Cancelled,
}

/// Deterministic slot assignment for a miner within one challenge round
pub fn miner_slot(challenge: &Challenge, address: Address) -> u64 {
    let mut input = Vec::with_capacity(52);
    input.extend_from_slice(challenge.as_bytes());
    input.extend_from_slice(address.as_slice());
    let digest = U256::from_be_bytes(keccak256(&input).0);
    (digest % U256::from(SLOT_COUNT)).try_into().unwrap_or(0)
}

/// Profit in whole percent, negative when the submission loses money
pub(crate) fn profit_percent(expected_reward: U256, tx_cost: U256) -> i64 {
    if tx_cost.is_zero() {
        return i64::MAX;
    }
    if expected_reward >= tx_cost {
        let pct = (expected_reward - tx_cost) * U256::from(100u64) / tx_cost;
        let pct: u64 = pct.try_into().unwrap_or(u64::MAX);
        pct.min(i64::MAX as u64) as i64
    } else {
        let pct = (tx_cost - expected_reward) * U256::from(100u64) / tx_cost;
        let pct: u64 = pct.try_into().unwrap_or(u64::MAX);
        -(pct.min(i64::MAX as u64) as i64)
    }
}

/// Tuning knobs for the gate, lifted from the mine config
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum profit percent required to submit
    pub profit_threshold: u64,
    /// Minimum spacing between two submissions
    pub min_submit_period: Duration,
    /// Re-evaluation interval while deferred
    pub check_interval: Duration,
    /// Gas price multiplier
    pub gas_multiplier: f32,
    /// Gas price ceiling in gwei
    pub gas_max_gwei: u64,
}

/// The submission gate
pub struct SubmissionGate {
    proxy: Arc<dyn DataProxy>,
    chain: Arc<dyn Chain>,
    address: Address,
    cfg: GateConfig,
}

impl SubmissionGate {
    /// Create the gate
    pub fn new(
        proxy: Arc<dyn DataProxy>,
        chain: Arc<dyn Chain>,
        address: Address,
        cfg: GateConfig,
    ) -> Self {
        Self {
            proxy,
            chain,
            address,
            cfg,
        }
    }

    /// Evaluate the gate rules for one candidate, deferring until they pass
    /// or the candidate dies
    pub async fn process(
        &self,
        work: &WorkItem,
        candidate: Candidate,
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome> {
        debug_assert_eq!(work.generation, candidate.generation);
        loop {
            // Rule 1: dispute status. Not recoverable by waiting; the
            // operator has to act.
            if let Some(status) = self.dispute_status().await? {
                if status != U256::from(1u64) {
                    return Err(Error::NotEligible);
                }
            } else if !self.defer(cancel, "dispute status not tracked yet").await {
                return Ok(SubmitOutcome::Cancelled);
            } else {
                continue;
            }

            let Some(snapshot) = self.snapshot().await? else {
                if !self.defer(cancel, "chain snapshot not tracked yet").await {
                    return Ok(SubmitOutcome::Cancelled);
                }
                continue;
            };

            // A stale nonce must never be submitted.
            if snapshot.challenge != work.challenge {
                info!(
                    generation = candidate.generation,
                    "challenge changed while deferred, discarding candidate"
                );
                return Ok(SubmitOutcome::Discarded);
            }

            // Rule 2: minimum submit period.
            let now = util::unix_now();
            let last = self.last_submit().await?;
            if now.saturating_sub(last) < self.cfg.min_submit_period.as_secs() {
                if !self.defer(cancel, "inside minimum submit period").await {
                    return Ok(SubmitOutcome::Cancelled);
                }
                continue;
            }

            // Rule 3: slot eligibility.
            if snapshot.ordered_fill
                && snapshot.slot_index != miner_slot(&work.challenge, self.address)
            {
                if !self.defer(cancel, "not our slot in ordered fill").await {
                    return Ok(SubmitOutcome::Cancelled);
                }
                continue;
            }

            // Rule 4: profitability.
            let Some(gas_price) = self.gas_price().await? else {
                if !self.defer(cancel, "gas price not tracked yet").await {
                    return Ok(SubmitOutcome::Cancelled);
                }
                continue;
            };
            let slots_remaining = SLOT_COUNT.saturating_sub(snapshot.slot_index).max(1);
            let expected_reward = snapshot.reward / U256::from(slots_remaining);
            let tx_cost = gas_price * U256::from(SUBMIT_GAS);
            let profit = profit_percent(expected_reward, tx_cost);
            if profit < self.cfg.profit_threshold as i64 {
                debug!(
                    profit,
                    threshold = self.cfg.profit_threshold,
                    "profit below threshold"
                );
                if !self.defer(cancel, "profit below threshold").await {
                    return Ok(SubmitOutcome::Cancelled);
                }
                continue;
            }

            // Rule 5: materialize values at submit time.
            let Some(values) = self.read_values(&work.request_ids).await? else {
                if !self.defer(cancel, "oracle values missing or zero").await {
                    return Ok(SubmitOutcome::Cancelled);
                }
                continue;
            };

            // Rule 6: sign and submit.
            return self.submit(work, &candidate, values, gas_price).await;
        }
    }

    /// Sleep one interrupt interval; false when shutdown arrived instead
    async fn defer(&self, cancel: &CancellationToken, reason: &str) -> bool {
        debug!(reason, interval = ?self.cfg.check_interval, "deferring candidate");
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.cfg.check_interval) => true,
        }
    }

    async fn dispute_status(&self) -> Result<Option<U256>> {
        let Some(raw) = self.proxy.get(keys::DISPUTE_STATUS).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        let trimmed = text.trim().trim_start_matches("0x");
        let status = U256::from_str_radix(trimmed, 16)
            .map_err(|e| Error::invalid_state(format!("bad dispute status \"{text}\": {e}")))?;
        Ok(Some(status))
    }

    async fn snapshot(&self) -> Result<Option<ChainSnapshot>> {
        let Some(raw) = self.proxy.get(keys::CURRENT_VARIABLES).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn last_submit(&self) -> Result<u64> {
        let key = keys::last_submit_for(self.address);
        let Some(raw) = self.proxy.get(&key).await? else {
            return Ok(0);
        };
        let text = String::from_utf8_lossy(&raw);
        text.trim()
            .parse()
            .map_err(|e| Error::invalid_state(format!("bad last submit value \"{text}\": {e}")))
    }

    async fn gas_price(&self) -> Result<Option<U256>> {
        let Some(raw) = self.proxy.get(keys::GAS_PRICE).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        let trimmed = text.trim().trim_start_matches("0x");
        let base = U256::from_str_radix(trimmed, 16)
            .map_err(|e| Error::invalid_state(format!("bad gas price \"{text}\": {e}")))?;
        Ok(Some(apply_gas_policy(
            base,
            self.cfg.gas_multiplier,
            self.cfg.gas_max_gwei,
        )))
    }

    /// Read the oracle values for the request ids; `None` when any value is
    /// missing or zero (defer, not fatal)
    async fn read_values(&self, request_ids: &[u64]) -> Result<Option<Vec<U256>>> {
        let kv_keys: Vec<String> = request_ids.iter().map(|id| keys::oracle_value(*id)).collect();
        let found: HashMap<String, Vec<u8>> = self.proxy.batch_get(&kv_keys).await?;
        let mut values = Vec::with_capacity(request_ids.len());
        for key in &kv_keys {
            let Some(raw) = found.get(key) else {
                warn!(%key, "oracle value missing at submit time");
                return Ok(None);
            };
            let text = String::from_utf8_lossy(raw);
            let value = U256::from_str_radix(text.trim(), 10)
                .map_err(|e| Error::invalid_state(format!("bad oracle value \"{text}\": {e}")))?;
            if value.is_zero() {
                warn!(%key, "oracle value is zero at submit time");
                return Ok(None);
            }
            values.push(value);
        }
        Ok(Some(values))
    }

    fn pad_payload(&self, work: &WorkItem, values: &[U256]) -> ([u64; 5], [U256; 5]) {
        let mut ids = [0u64; MAX_REQUEST_IDS];
        let mut vals = [U256::ZERO; MAX_REQUEST_IDS];
        for (i, id) in work.request_ids.iter().take(MAX_REQUEST_IDS).enumerate() {
            ids[i] = *id;
            vals[i] = values[i];
        }
        (ids, vals)
    }

    /// Submit with bounded retries; transient rejections rebuild the payload
    /// from current KV values and bump the gas price
    async fn submit(
        &self,
        work: &WorkItem,
        candidate: &Candidate,
        mut values: Vec<U256>,
        mut gas_price: U256,
    ) -> Result<SubmitOutcome> {
        let mut last_error = String::new();
        for attempt in 1..=MAX_SUBMIT_ATTEMPTS {
            let (ids, vals) = self.pad_payload(work, &values);
            match self
                .chain
                .submit_solution(&candidate.nonce, ids, vals, gas_price)
                .await
            {
                Ok(tx) => {
                    let now = util::unix_now();
                    let key = keys::last_submit_for(self.address);
                    self.proxy.put(&key, now.to_string().as_bytes()).await?;
                    info!(
                        %tx,
                        nonce = %candidate.nonce,
                        generation = candidate.generation,
                        attempt,
                        "solution submitted"
                    );
                    return Ok(SubmitOutcome::Submitted {
                        tx,
                        nonce: candidate.nonce.clone(),
                    });
                }
                Err(err) if attempt < MAX_SUBMIT_ATTEMPTS && is_transient_rejection(&err) => {
                    warn!(%err, attempt, "submission rejected, rebuilding payload and bumping gas");
                    last_error = err.to_string();
                    gas_price = gas_price * U256::from(GAS_BUMP_PERCENT) / U256::from(100u64);
                    // Rebuilt, not replayed: values are re-read from the KV.
                    match self.read_values(&work.request_ids).await? {
                        Some(fresh) => values = fresh,
                        None => {
                            warn!("oracle values disappeared during retry, keeping previous payload");
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::SubmitFailed {
            attempts: MAX_SUBMIT_ATTEMPTS,
            message: last_error,
        })
    }
}

/// Rejections worth rebuilding and retrying: fee too low, nonce races and
/// plain transport failures
fn is_transient_rejection(err: &Error) -> bool {
    if err.is_retryable() {
        return true;
    }
    let message = err.to_string().to_lowercase();
    message.contains("underpriced")
        || message.contains("nonce")
        || message.contains("replacement transaction")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profit_percent() {
        // reward 350, cost 100: 250% profit.
        assert_eq!(
            profit_percent(U256::from(350u64), U256::from(100u64)),
            250
        );
        // reward 250, cost 100: 150%.
        assert_eq!(
            profit_percent(U256::from(250u64), U256::from(100u64)),
            150
        );
        // break-even.
        assert_eq!(profit_percent(U256::from(100u64), U256::from(100u64)), 0);
        // losing money is negative, not zero.
        assert_eq!(profit_percent(U256::from(50u64), U256::from(100u64)), -50);
        // free transactions never block a submission.
        assert_eq!(profit_percent(U256::from(1u64), U256::ZERO), i64::MAX);
    }

    #[test]
    fn test_miner_slot_deterministic_and_bounded() {
        let challenge = Challenge::from_bytes([9; 32]);
        let addr = Address::from_slice(&[1; 20]);
        let slot = miner_slot(&challenge, addr);
        assert!(slot < SLOT_COUNT);
        assert_eq!(slot, miner_slot(&challenge, addr));
        // A different challenge reshuffles assignments eventually; over a
        // set of challenges the slots cannot all collide on one value.
        let mut seen = std::collections::HashSet::new();
        for byte in 0..32u8 {
            seen.insert(miner_slot(&Challenge::from_bytes([byte; 32]), addr));
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_transient_rejection_classification() {
        assert!(is_transient_rejection(&Error::chain(
            "eth_sendRawTransaction: transaction underpriced"
        )));
        assert!(is_transient_rejection(&Error::chain(
            "eth_sendRawTransaction: nonce too low"
        )));
        assert!(is_transient_rejection(&Error::network("connection reset")));
        assert!(!is_transient_rejection(&Error::chain("execution reverted")));
        assert!(!is_transient_rejection(&Error::NotEligible));
    }
}
