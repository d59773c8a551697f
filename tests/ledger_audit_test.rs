use chrono::{Duration, TimeZone, Utc};
use cortex_coach::audit::codes;
use cortex_coach::ledger::LedgerWriter;
use cortex_coach::models::AuditStatus;
use cortex_coach::{
    EvidenceRefs, GovernancePaths, JsonlLedger, LedgerAuditor, RolloutMode, TransitionRecord,
};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use tempfile::TempDir;

fn setup() -> (TempDir, GovernancePaths) {
    let temp = TempDir::new().unwrap();
    let paths = GovernancePaths::for_project(temp.path());
    (temp, paths)
}

fn report_path(paths: &GovernancePaths) -> std::path::PathBuf {
    paths.resolve("reports/project_state/phase5_mode_transition_audit_report_v0.json")
}

/// off -> experimental -> default, fully evidenced
fn write_valid_chain(paths: &GovernancePaths) {
    let ledger = JsonlLedger::new(paths.ledger_file());
    let start = Utc.with_ymd_and_hms(2026, 9, 1, 9, 0, 0).unwrap();
    let steps = [
        (RolloutMode::Experimental, RolloutMode::Off, ""),
        (RolloutMode::Off, RolloutMode::Experimental, ""),
        (RolloutMode::Experimental, RolloutMode::Default, ""),
    ];
    for (i, (from, to, incident)) in steps.into_iter().enumerate() {
        let record = TransitionRecord::new(
            from,
            to,
            start + Duration::days(i as i64),
            "release-bot",
            "scheduled step",
            incident,
            EvidenceRefs::new(vec!["d1"], vec!["r1"], vec!["a1"]),
        );
        ledger.append(&record).unwrap();
    }
}

#[test]
fn test_empty_ledger_passes_and_writes_report() {
    let (_temp, paths) = setup();
    let report = LedgerAuditor::for_paths(&paths)
        .run_and_persist(&report_path(&paths))
        .unwrap();

    assert_eq!(report.status, AuditStatus::Pass);
    assert_eq!(report.summary.transition_count, 0);
    assert_eq!(report.summary.transition_completeness_rate, 1.0);
    assert!(report_path(&paths).exists());
    assert!(!paths.ledger_file().exists());
}

#[test]
fn test_valid_chain_passes() {
    let (_temp, paths) = setup();
    write_valid_chain(&paths);

    let report = LedgerAuditor::for_paths(&paths).run().unwrap();
    assert!(report.passed(), "unexpected findings: {:?}", report.findings);
    assert_eq!(report.summary.transition_count, 3);
    assert_eq!(report.summary.complete_transition_count, 3);
    assert_eq!(report.state.ledger_mode, Some(RolloutMode::Default));
}

#[test]
fn test_garbage_line_fails_audit() {
    let (_temp, paths) = setup();
    write_valid_chain(&paths);
    let mut file = OpenOptions::new().append(true).open(paths.ledger_file()).unwrap();
    writeln!(file, "this is not json").unwrap();

    let report = LedgerAuditor::for_paths(&paths)
        .run_and_persist(&report_path(&paths))
        .unwrap();

    assert_eq!(report.status, AuditStatus::Fail);
    assert!(report.summary.finding_count >= 1);
    assert_eq!(report.summary.transition_count, 3);
    assert_eq!(report.findings[0].code, codes::INVALID_TRANSITION_JSON);
    assert_eq!(report.findings[0].line, 4);
}

#[test]
fn test_report_shape_read_by_downstream_gates() {
    let (_temp, paths) = setup();
    write_valid_chain(&paths);
    LedgerAuditor::for_paths(&paths)
        .run_and_persist(&report_path(&paths))
        .unwrap();

    let json: Value =
        serde_json::from_str(&fs::read_to_string(report_path(&paths)).unwrap()).unwrap();
    assert_eq!(json["status"], "pass");
    assert_eq!(json["summary"]["transition_count"], 3);
    assert_eq!(json["summary"]["finding_count"], 0);
    assert_eq!(json["summary"]["transition_completeness_rate"], 1.0);
    assert!(json["findings"].as_array().unwrap().is_empty());
    assert!(json["state"].get("state_mode").is_some());
}

#[test]
fn test_edited_record_is_detected() {
    let (_temp, paths) = setup();
    write_valid_chain(&paths);

    let content = fs::read_to_string(paths.ledger_file()).unwrap();
    let tampered = content.replacen("scheduled step", "something else", 1);
    fs::write(paths.ledger_file(), tampered).unwrap();

    let report = LedgerAuditor::for_paths(&paths).run().unwrap();
    assert_eq!(report.status, AuditStatus::Fail);
    assert_eq!(report.summary.complete_transition_count, 2);
    assert!(report
        .findings
        .iter()
        .any(|f| f.code == codes::TRANSITION_ID_MISMATCH && f.line == 1));
}
