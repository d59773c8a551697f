//! LedgerAuditor - independent replay and validation of the transition ledger

use crate::ledger::{JsonlLedger, LedgerError, LedgerLine, LedgerReader};
use crate::models::audit::AUDIT_REPORT_VERSION;
use crate::models::rollout::format_timestamp;
use crate::models::{
    AuditFinding, AuditReport, AuditStatus, AuditSummary, GovernancePaths, RolloutMode,
    RolloutState, StateConsistency, TransitionRecord,
};
use crate::utils::write_json_atomic;
use crate::validator;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Finding codes for structural problems (rule violations reuse the
/// validator's codes)
pub mod codes {
    pub const INVALID_TRANSITION_JSON: &str = "invalid_transition_json";
    pub const INVALID_TRANSITION_RECORD: &str = "invalid_transition_record";
    pub const INVALID_CHANGED_AT: &str = "invalid_changed_at";
    pub const TRANSITION_ID_MISMATCH: &str = "transition_id_mismatch";
    pub const NOOP_TRANSITION_RECORDED: &str = "noop_transition_recorded";
    pub const TRANSITION_CHAIN_BREAK: &str = "transition_chain_break";
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Failed to write audit report {}: {source}", .path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Replays a ledger top to bottom and checks every record.
///
/// Reads the ledger and state file directly; shares nothing with the
/// store's runtime path apart from the rule set.
pub struct LedgerAuditor<R = JsonlLedger> {
    ledger: R,
    ledger_path: PathBuf,
    state_path: PathBuf,
}

impl LedgerAuditor<JsonlLedger> {
    pub fn new(ledger_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        let ledger_path = ledger_path.into();
        Self {
            ledger: JsonlLedger::new(&ledger_path),
            ledger_path,
            state_path: state_path.into(),
        }
    }

    pub fn for_paths(paths: &GovernancePaths) -> Self {
        Self::new(paths.ledger_file(), paths.state_file())
    }
}

impl<R: LedgerReader> LedgerAuditor<R> {
    /// Audit an arbitrary ledger backend; `ledger_path` is only reported
    pub fn with_reader(ledger: R, ledger_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            ledger,
            ledger_path: ledger_path.into(),
            state_path: state_path.into(),
        }
    }

    /// Scan the whole ledger. Bad lines become findings; only I/O failures
    /// abort the scan.
    pub fn run(&self) -> Result<AuditReport, AuditError> {
        let mut findings = Vec::new();
        let mut transition_count = 0usize;
        let mut complete_count = 0usize;
        let mut previous: Option<TransitionRecord> = None;

        for entry in self.ledger.scan()? {
            let entry = entry?;
            match entry.content {
                LedgerLine::InvalidJson { error } => {
                    findings.push(AuditFinding {
                        code: codes::INVALID_TRANSITION_JSON.to_string(),
                        line: entry.line,
                        transition_id: None,
                        message: format!("line is not a JSON object: {}", error),
                    });
                }
                LedgerLine::InvalidRecord { error } => {
                    transition_count += 1;
                    findings.push(AuditFinding {
                        code: codes::INVALID_TRANSITION_RECORD.to_string(),
                        line: entry.line,
                        transition_id: None,
                        message: format!("not a valid transition record: {}", error),
                    });
                }
                LedgerLine::Record(record) => {
                    transition_count += 1;
                    let record_findings =
                        check_record(entry.line, &record, previous.as_ref().map(|p| p.to_mode));
                    if record_findings.is_empty() {
                        complete_count += 1;
                    }
                    findings.extend(record_findings);
                    previous = Some(record);
                }
            }
        }

        let rate = if transition_count == 0 {
            1.0
        } else {
            complete_count as f64 / transition_count as f64
        };
        let status = if findings.is_empty() && rate >= 1.0 {
            AuditStatus::Pass
        } else {
            AuditStatus::Fail
        };

        let report = AuditReport {
            version: AUDIT_REPORT_VERSION.to_string(),
            generated_at: format_timestamp(Utc::now()),
            ledger_path: self.ledger_path.display().to_string(),
            state_path: self.state_path.display().to_string(),
            status,
            summary: AuditSummary {
                transition_count,
                complete_transition_count: complete_count,
                finding_count: findings.len(),
                transition_completeness_rate: rate,
            },
            findings,
            state: self.state_consistency(previous.as_ref()),
        };

        tracing::info!(
            status = %report.status,
            transitions = report.summary.transition_count,
            findings = report.summary.finding_count,
            "rollout ledger audit complete"
        );
        Ok(report)
    }

    /// Run the audit and persist the report; the report is the only write
    pub fn run_and_persist(&self, report_path: &Path) -> Result<AuditReport, AuditError> {
        let report = self.run()?;
        persist_report(&report, report_path)?;
        Ok(report)
    }

    fn state_consistency(&self, ledger_head: Option<&TransitionRecord>) -> StateConsistency {
        let cached = std::fs::read_to_string(&self.state_path)
            .ok()
            .and_then(|content| serde_json::from_str::<RolloutState>(&content).ok());

        let state_mode = cached.as_ref().map(|s| s.mode);
        let state_last_transition_id = cached.and_then(|s| s.last_transition_id);
        let ledger_mode = ledger_head.map(|r| r.to_mode);
        let ledger_last_transition_id = ledger_head.map(|r| r.transition_id.clone());

        let consistent = match (&ledger_last_transition_id, &state_last_transition_id) {
            (Some(ledger_id), Some(state_id)) => ledger_id == state_id,
            (None, None) => true,
            _ => false,
        };

        StateConsistency {
            state_mode,
            ledger_mode,
            state_last_transition_id,
            ledger_last_transition_id,
            consistent,
        }
    }
}

/// Structural checks plus the write-time policy rules, applied to one record
fn check_record(
    line: usize,
    record: &TransitionRecord,
    previous_to: Option<RolloutMode>,
) -> Vec<AuditFinding> {
    let finding = |code: &str, message: String| AuditFinding {
        code: code.to_string(),
        line,
        transition_id: Some(record.transition_id.clone()),
        message,
    };
    let mut findings = Vec::new();

    if DateTime::parse_from_rfc3339(&record.changed_at).is_err() {
        findings.push(finding(
            codes::INVALID_CHANGED_AT,
            format!("changed_at '{}' is not an RFC 3339 timestamp", record.changed_at),
        ));
    }
    if !record.has_valid_id() {
        findings.push(finding(
            codes::TRANSITION_ID_MISMATCH,
            format!(
                "stored id does not match record contents (expected {})",
                record.compute_id()
            ),
        ));
    }
    if record.from_mode == record.to_mode {
        findings.push(finding(
            codes::NOOP_TRANSITION_RECORDED,
            format!("transition from {} to itself", record.from_mode),
        ));
    }
    if let Some(previous_to) = previous_to {
        if previous_to != record.from_mode {
            findings.push(finding(
                codes::TRANSITION_CHAIN_BREAK,
                format!(
                    "from_mode {} does not follow previous to_mode {}",
                    record.from_mode, previous_to
                ),
            ));
        }
    }

    for violation in validator::validate_record(record) {
        findings.push(finding(violation.code.as_str(), violation.message));
    }
    findings
}

/// Write the report as pretty JSON, atomically
pub fn persist_report(report: &AuditReport, path: &Path) -> Result<(), AuditError> {
    write_json_atomic(path, report).map_err(|source| AuditError::ReportWrite {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerWriter, MemoryLedger};
    use crate::models::EvidenceRefs;
    use crate::validator::ViolationCode;

    fn record(from: RolloutMode, to: RolloutMode) -> TransitionRecord {
        TransitionRecord::new(
            from,
            to,
            Utc::now(),
            "ops",
            "planned",
            "INC-1",
            EvidenceRefs::new(vec!["d1"], vec!["r1"], vec!["a1"]),
        )
    }

    fn audit(ledger: MemoryLedger) -> AuditReport {
        LedgerAuditor::with_reader(ledger, "memory", "/nonexistent/state.json")
            .run()
            .unwrap()
    }

    fn finding_codes(report: &AuditReport) -> Vec<&str> {
        report.findings.iter().map(|f| f.code.as_str()).collect()
    }

    #[test]
    fn test_empty_ledger_is_vacuously_complete() {
        let report = audit(MemoryLedger::new());
        assert_eq!(report.status, AuditStatus::Pass);
        assert_eq!(report.summary.transition_count, 0);
        assert_eq!(report.summary.transition_completeness_rate, 1.0);
        assert!(report.state.consistent);
    }

    #[test]
    fn test_clean_chain_passes() {
        let ledger = MemoryLedger::new();
        ledger.append(&record(RolloutMode::Experimental, RolloutMode::Default)).unwrap();
        ledger.append(&record(RolloutMode::Default, RolloutMode::Off)).unwrap();

        let report = audit(ledger);
        assert!(report.passed(), "findings: {:?}", report.findings);
        assert_eq!(report.summary.complete_transition_count, 2);
        assert_eq!(report.state.ledger_mode, Some(RolloutMode::Off));
    }

    #[test]
    fn test_all_problems_reported_in_one_pass() {
        let ledger = MemoryLedger::new();
        ledger.push_raw("not json");
        ledger.push_raw(r#"{"from_mode": "off"}"#);
        ledger.append(&record(RolloutMode::Experimental, RolloutMode::Off)).unwrap();
        ledger.push_raw("also garbage");

        let report = audit(ledger);
        assert_eq!(report.status, AuditStatus::Fail);
        assert_eq!(
            finding_codes(&report),
            vec![
                codes::INVALID_TRANSITION_JSON,
                codes::INVALID_TRANSITION_RECORD,
                codes::INVALID_TRANSITION_JSON,
            ]
        );
        assert_eq!(report.findings[2].line, 4);
        assert_eq!(report.summary.transition_count, 2);
        assert_eq!(report.summary.complete_transition_count, 1);
        assert_eq!(report.summary.transition_completeness_rate, 0.5);
    }

    #[test]
    fn test_lax_historical_record_is_not_grandfathered() {
        // Written by an older writer that did not require evidence
        let lax = TransitionRecord::new(
            RolloutMode::Experimental,
            RolloutMode::Default,
            Utc::now(),
            "ops",
            "promote",
            "",
            EvidenceRefs::default(),
        );
        let ledger = MemoryLedger::new();
        ledger.append(&lax).unwrap();
        ledger.append(&record(RolloutMode::Default, RolloutMode::Off)).unwrap();

        let report = audit(ledger);
        assert_eq!(report.status, AuditStatus::Fail);
        let found = finding_codes(&report);
        assert!(found.contains(&ViolationCode::MissingDecisionRefsForDefault.as_str()));
        assert!(found.contains(&ViolationCode::MissingAuditRefsForDefault.as_str()));
        assert!(report.findings.iter().all(|f| f.line == 1));
    }

    #[test]
    fn test_tampered_record_is_flagged() {
        let mut tampered = record(RolloutMode::Experimental, RolloutMode::Off);
        tampered.changed_by = "someone else".to_string();
        let ledger = MemoryLedger::new();
        ledger.append(&tampered).unwrap();

        let report = audit(ledger);
        assert_eq!(finding_codes(&report), vec![codes::TRANSITION_ID_MISMATCH]);
    }

    #[test]
    fn test_chain_break_and_noop_are_flagged() {
        let ledger = MemoryLedger::new();
        ledger.append(&record(RolloutMode::Experimental, RolloutMode::Off)).unwrap();
        ledger.append(&record(RolloutMode::Experimental, RolloutMode::Experimental)).unwrap();

        let report = audit(ledger);
        let found = finding_codes(&report);
        assert!(found.contains(&codes::NOOP_TRANSITION_RECORDED));
        assert!(found.contains(&codes::TRANSITION_CHAIN_BREAK));
        assert_eq!(report.summary.complete_transition_count, 1);
    }
}
