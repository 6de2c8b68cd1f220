//! Work items and candidate solutions

use alloy_primitives::{Address, U256};

use crate::core::{pow, ChainSnapshot, Challenge};

/// One unit of mining work derived from a chain snapshot
///
/// Work items are totally ordered by `generation`; a candidate is only valid
/// for the generation it was mined against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Challenge gating this round
    pub challenge: Challenge,
    /// Difficulty at the time the work was issued
    pub difficulty: U256,
    /// Request ids that must be answered alongside the nonce
    pub request_ids: Vec<u64>,
    /// Miner public address, part of the hash preimage
    pub address: Address,
    /// Logical generation counter used to discard stale solutions
    pub generation: u64,
}

impl WorkItem {
    /// Build a work item from a snapshot, stamping the given generation
    pub fn from_snapshot(snapshot: &ChainSnapshot, address: Address, generation: u64) -> Self {
        Self {
            challenge: snapshot.challenge,
            difficulty: snapshot.difficulty,
            request_ids: snapshot.request_ids.clone(),
            address,
            generation,
        }
    }

    /// Hash-target ceiling for this work item
    pub fn target(&self) -> U256 {
        pow::target_for(self.difficulty)
    }

    /// Check a nonce against this work item's challenge and difficulty
    pub fn accepts(&self, nonce: &str) -> bool {
        pow::is_valid_solution(self.address, &self.challenge, nonce, self.difficulty)
    }
}

/// A solution candidate produced by a hasher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Winning nonce as its ASCII decimal form
    pub nonce: String,
    /// Generation of the work item the nonce was mined against
    pub generation: u64,
    /// Index of the hasher that found it, for logging
    pub hasher_id: usize,
}
