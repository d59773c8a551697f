//! Rollout Mode State Module
//!
//! Persists the current governance rollout mode:
//! - Ledger append of every accepted transition (source of truth)
//! - Cached state projection written after the append
//! - Drift detection between the projection and the ledger

mod store;

pub use store::{
    GovernanceStore, ProposeOutcome, RolloutSnapshot, StateDrift, StoreError, TransitionRequest,
};
