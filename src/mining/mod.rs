//! The miner's coordination loop
//!
//! [`group`] fans a work item out to the hashers and returns the first
//! valid candidate; [`work_source`] turns chain snapshots into generations
//! of work; [`submitter`] decides when a candidate may actually be sent to
//! the contract; [`manager`] wires the three together under one
//! cancellation tree.

pub mod group;
pub mod manager;
pub mod submitter;
pub mod work_source;

pub use group::MiningGroup;
pub use manager::{MinerDeps, MiningManager};
pub use submitter::{SubmissionGate, SubmitOutcome};
pub use work_source::WorkSource;
