//! Core types for the oracle mining client
//!
//! Challenges, work items, candidate solutions and the proof-of-work
//! predicate shared by every hasher variant.

mod challenge;
mod pow;
mod work;

pub use challenge::{ChainSnapshot, Challenge};
pub use pow::{is_valid_solution, solution_digest, target_for};
pub use work::{Candidate, WorkItem};

/// Protocol constants
pub mod constants {
    /// Size of a challenge in bytes
    pub const CHALLENGE_SIZE: usize = 32;

    /// Miner slots per challenge
    pub const SLOT_COUNT: u64 = 5;

    /// Maximum number of request ids carried by one challenge
    pub const MAX_REQUEST_IDS: usize = 5;

    /// Gas units consumed by one solution submission, used for profitability
    pub const SUBMIT_GAS: u64 = 1_000_000;
}
