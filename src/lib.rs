// Cortex Coach - project governance lock and rollout ledger
// Serializes writers to .cortex/ and keeps an auditable history of rollout mode changes

pub mod audit;
pub mod cli;
pub mod ledger;
pub mod lock;
pub mod models;
pub mod state;
pub mod utils;
pub mod validator;

pub use anyhow::{Context, Result};

// Re-export commonly used types
pub use audit::LedgerAuditor;
pub use ledger::{JsonlLedger, LedgerReader, LedgerWriter};
pub use lock::{LockError, LockOptions, ProjectLock};
pub use models::{
    AuditReport, CoachConfig, EvidenceRefs, GovernancePaths, RolloutMode, RolloutState,
    TransitionRecord,
};
pub use state::{GovernanceStore, StoreError, TransitionRequest};
