//! Project Lock Module
//!
//! Mutual exclusion for commands that mutate `.cortex/`:
//! - Exclusive creation of `.cortex/.lock` as the lock primitive
//! - Stale-lock reclaim (unparsable record, hold age, dead owner)
//! - Token-checked release on every exit path

mod liveness;
mod manager;

pub use liveness::{probe, Liveness};
pub use manager::{
    inspect, record_stale_reason, LockError, LockInspection, LockOptions, ProjectLock, StaleReason,
};
