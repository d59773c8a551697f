//! Transition policy rules.
//!
//! Pure functions: the same rules gate `propose` at write time and are
//! re-applied to every historical record by the auditor.

use crate::models::{EvidenceRefs, RolloutMode, TransitionRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable policy violation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    MissingChangedBy,
    MissingReason,
    MissingDecisionRefsForDefault,
    MissingReflectionRefsForDefault,
    MissingAuditRefsForDefault,
    MissingIncidentRefForDefaultRollback,
}

impl ViolationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationCode::MissingChangedBy => "missing_changed_by",
            ViolationCode::MissingReason => "missing_reason",
            ViolationCode::MissingDecisionRefsForDefault => "missing_decision_refs_for_default",
            ViolationCode::MissingReflectionRefsForDefault => "missing_reflection_refs_for_default",
            ViolationCode::MissingAuditRefsForDefault => "missing_audit_refs_for_default",
            ViolationCode::MissingIncidentRefForDefaultRollback => {
                "missing_incident_ref_for_default_rollback"
            }
        }
    }

    /// Human-readable explanation shown next to the code
    pub fn message(&self) -> &'static str {
        match self {
            ViolationCode::MissingChangedBy => "changed_by is required for every transition",
            ViolationCode::MissingReason => "reason is required for every transition",
            ViolationCode::MissingDecisionRefsForDefault => {
                "promotion to default requires at least one decision ref"
            }
            ViolationCode::MissingReflectionRefsForDefault => {
                "promotion to default requires at least one reflection ref"
            }
            ViolationCode::MissingAuditRefsForDefault => {
                "promotion to default requires at least one audit ref"
            }
            ViolationCode::MissingIncidentRefForDefaultRollback => {
                "rolling back out of default requires an incident ref"
            }
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed rule, with the reason string callers display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: ViolationCode,
    pub message: String,
}

impl From<ViolationCode> for Violation {
    fn from(code: ViolationCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// The fields of a transition the rules look at
#[derive(Debug, Clone, Copy)]
pub struct ProposedTransition<'a> {
    pub to_mode: RolloutMode,
    pub changed_by: &'a str,
    pub reason: &'a str,
    pub incident_ref: &'a str,
    pub evidence: &'a EvidenceRefs,
}

impl<'a> ProposedTransition<'a> {
    pub fn from_record(record: &'a TransitionRecord) -> Self {
        Self {
            to_mode: record.to_mode,
            changed_by: &record.changed_by,
            reason: &record.reason,
            incident_ref: &record.incident_ref,
            evidence: &record.evidence,
        }
    }
}

/// Check a proposed transition away from `current`.
///
/// Every rule is evaluated independently, so one call can report several
/// violations. An empty result means the transition is allowed.
pub fn validate(current: RolloutMode, proposed: &ProposedTransition<'_>) -> Vec<Violation> {
    let mut violations = Vec::new();

    if is_blank(proposed.changed_by) {
        violations.push(ViolationCode::MissingChangedBy.into());
    }
    if is_blank(proposed.reason) {
        violations.push(ViolationCode::MissingReason.into());
    }

    if proposed.to_mode == RolloutMode::Default {
        if !has_refs(&proposed.evidence.decision_refs) {
            violations.push(ViolationCode::MissingDecisionRefsForDefault.into());
        }
        if !has_refs(&proposed.evidence.reflection_refs) {
            violations.push(ViolationCode::MissingReflectionRefsForDefault.into());
        }
        if !has_refs(&proposed.evidence.audit_refs) {
            violations.push(ViolationCode::MissingAuditRefsForDefault.into());
        }
    }

    let rolling_back = matches!(
        proposed.to_mode,
        RolloutMode::Experimental | RolloutMode::Off
    );
    if current == RolloutMode::Default && rolling_back && is_blank(proposed.incident_ref) {
        violations.push(ViolationCode::MissingIncidentRefForDefaultRollback.into());
    }

    violations
}

/// Re-apply the rules to a stored record against its own `from_mode`
pub fn validate_record(record: &TransitionRecord) -> Vec<Violation> {
    validate(record.from_mode, &ProposedTransition::from_record(record))
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn has_refs(refs: &[String]) -> bool {
    refs.iter().any(|r| !is_blank(r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn codes(violations: &[Violation]) -> Vec<ViolationCode> {
        violations.iter().map(|v| v.code).collect()
    }

    fn proposal<'a>(to_mode: RolloutMode, evidence: &'a EvidenceRefs) -> ProposedTransition<'a> {
        ProposedTransition {
            to_mode,
            changed_by: "ops",
            reason: "scheduled change",
            incident_ref: "",
            evidence,
        }
    }

    #[test]
    fn test_plain_transition_passes() {
        let evidence = EvidenceRefs::default();
        let violations = validate(RolloutMode::Experimental, &proposal(RolloutMode::Off, &evidence));
        assert!(violations.is_empty());
    }

    #[test]
    fn test_missing_who_and_why_reported_together() {
        let evidence = EvidenceRefs::default();
        let mut p = proposal(RolloutMode::Off, &evidence);
        p.changed_by = "  ";
        p.reason = "";

        let violations = validate(RolloutMode::Experimental, &p);
        assert_eq!(
            codes(&violations),
            vec![ViolationCode::MissingChangedBy, ViolationCode::MissingReason]
        );
    }

    #[test]
    fn test_promotion_requires_all_three_evidence_kinds() {
        let evidence = EvidenceRefs::default();
        let violations = validate(RolloutMode::Experimental, &proposal(RolloutMode::Default, &evidence));
        assert_eq!(
            codes(&violations),
            vec![
                ViolationCode::MissingDecisionRefsForDefault,
                ViolationCode::MissingReflectionRefsForDefault,
                ViolationCode::MissingAuditRefsForDefault,
            ]
        );
    }

    #[test]
    fn test_promotion_missing_only_decision_refs() {
        let evidence = EvidenceRefs::new(vec![], vec!["r1"], vec!["a1"]);
        let violations = validate(RolloutMode::Experimental, &proposal(RolloutMode::Default, &evidence));
        assert_eq!(codes(&violations), vec![ViolationCode::MissingDecisionRefsForDefault]);
        assert_eq!(violations[0].code.as_str(), "missing_decision_refs_for_default");
    }

    #[test]
    fn test_rollback_from_default_requires_incident() {
        let evidence = EvidenceRefs::default();
        for target in [RolloutMode::Off, RolloutMode::Experimental] {
            let violations = validate(RolloutMode::Default, &proposal(target, &evidence));
            assert_eq!(
                codes(&violations),
                vec![ViolationCode::MissingIncidentRefForDefaultRollback]
            );

            let mut with_incident = proposal(target, &evidence);
            with_incident.incident_ref = "INC-1";
            assert!(validate(RolloutMode::Default, &with_incident).is_empty());
        }
    }

    #[test]
    fn test_incident_not_required_outside_default() {
        let evidence = EvidenceRefs::default();
        let violations = validate(RolloutMode::Experimental, &proposal(RolloutMode::Off, &evidence));
        assert!(violations.is_empty());
    }

    #[test]
    fn test_validate_record_uses_record_from_mode() {
        let record = TransitionRecord::new(
            RolloutMode::Default,
            RolloutMode::Off,
            Utc::now(),
            "ops",
            "emergency stop",
            "",
            EvidenceRefs::default(),
        );
        assert_eq!(
            codes(&validate_record(&record)),
            vec![ViolationCode::MissingIncidentRefForDefaultRollback]
        );
    }

    #[test]
    fn test_violation_serializes_as_code() {
        let v: Violation = ViolationCode::MissingReason.into();
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["code"], "missing_reason");
        assert_eq!(v.to_string(), "missing_reason: reason is required for every transition");
    }
}
