use serde::{Deserialize, Serialize};
use std::fmt;

use super::rollout::RolloutMode;

pub const AUDIT_REPORT_VERSION: &str = "v0";

/// Overall audit verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pass,
    Fail,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pass => "pass",
            AuditStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem found in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFinding {
    /// Machine-readable finding code (`invalid_transition_json`, rule codes, ...)
    pub code: String,
    /// 1-indexed ledger line
    pub line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub transition_count: usize,
    pub complete_transition_count: usize,
    pub finding_count: usize,
    pub transition_completeness_rate: f64,
}

/// Advisory comparison between the cached state file and the ledger head.
/// Never affects the audit status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConsistency {
    pub state_mode: Option<RolloutMode>,
    pub ledger_mode: Option<RolloutMode>,
    pub state_last_transition_id: Option<String>,
    pub ledger_last_transition_id: Option<String>,
    pub consistent: bool,
}

/// Persisted output of a ledger audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub version: String,
    pub generated_at: String,
    pub ledger_path: String,
    pub state_path: String,
    pub status: AuditStatus,
    pub summary: AuditSummary,
    pub findings: Vec<AuditFinding>,
    pub state: StateConsistency,
}

impl AuditReport {
    pub fn passed(&self) -> bool {
        self.status == AuditStatus::Pass
    }
}
