pub mod audit;
pub mod config;
pub mod lock;
pub mod rollout;

pub use audit::{AuditFinding, AuditReport, AuditStatus, AuditSummary, StateConsistency};
pub use config::{AuditConfig, CoachConfig, GovernancePaths, LockConfig};
pub use lock::LockRecord;
pub use rollout::{EvidenceRefs, RolloutMode, RolloutState, TransitionRecord};
