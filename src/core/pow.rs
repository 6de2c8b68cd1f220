//! The proof-of-work predicate
//!
//! A nonce solves the current challenge when
//! `keccak256(address || challenge || nonce)` taken as a big-endian integer,
//! reduced modulo [`SOLUTION_MODULUS`], is strictly below the target derived
//! from the difficulty. The same predicate is used by the hash search inner
//! loop and by candidate re-verification before forwarding.

use alloy_primitives::{keccak256, Address, U256};

use crate::core::Challenge;

/// Modulus applied by the contract before the target comparison.
///
/// The target is defined as `(2^256 - 1) / difficulty`, so the consistent
/// modulus is `2^256 - 1` itself; the reduction only folds the all-ones
/// digest back to zero.
pub const SOLUTION_MODULUS: U256 = U256::MAX;

/// Derive the hash-target ceiling from the difficulty
///
/// Difficulty zero would divide by zero; it is treated as the open target so
/// a malformed snapshot cannot panic the hashers.
pub fn target_for(difficulty: U256) -> U256 {
    if difficulty.is_zero() {
        U256::MAX
    } else {
        U256::MAX / difficulty
    }
}

/// Compute the solution digest for an (address, challenge, nonce) triple
///
/// The nonce enters the hash as its ASCII decimal form, exactly as it is
/// later submitted to the contract.
pub fn solution_digest(address: Address, challenge: &Challenge, nonce: &str) -> U256 {
    let mut input = Vec::with_capacity(20 + 32 + nonce.len());
    input.extend_from_slice(address.as_slice());
    input.extend_from_slice(challenge.as_bytes());
    input.extend_from_slice(nonce.as_bytes());
    let digest = keccak256(&input);
    let value = U256::from_be_bytes(digest.0);
    value % SOLUTION_MODULUS
}

/// Check whether a nonce solves the challenge at the given difficulty
pub fn is_valid_solution(
    address: Address,
    challenge: &Challenge,
    nonce: &str,
    difficulty: U256,
) -> bool {
    solution_digest(address, challenge, nonce) < target_for(difficulty)
}
