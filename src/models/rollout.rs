//! Rollout mode data model: the mode enum, the cached state projection and
//! the immutable transition records that make up the ledger.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Schema tag written into the state file
pub const STATE_SCHEMA_VERSION: &str = "v0";

/// Governance rollout mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutMode {
    /// Governance tooling disabled
    Off,
    /// Opt-in, non-blocking governance
    Experimental,
    /// Governance enforced by default
    Default,
}

impl RolloutMode {
    pub const ALL: [RolloutMode; 3] = [
        RolloutMode::Off,
        RolloutMode::Experimental,
        RolloutMode::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutMode::Off => "off",
            RolloutMode::Experimental => "experimental",
            RolloutMode::Default => "default",
        }
    }
}

impl fmt::Display for RolloutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RolloutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(RolloutMode::Off),
            "experimental" => Ok(RolloutMode::Experimental),
            "default" => Ok(RolloutMode::Default),
            other => Err(format!(
                "invalid rollout mode '{}' (expected off|experimental|default)",
                other
            )),
        }
    }
}

/// Evidence citations justifying a transition.
///
/// Each list behaves as a set: entries are trimmed, blanks dropped, and the
/// remainder de-duplicated and sorted, so the same evidence always encodes
/// identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRefs {
    #[serde(default)]
    pub decision_refs: Vec<String>,
    #[serde(default)]
    pub reflection_refs: Vec<String>,
    #[serde(default)]
    pub audit_refs: Vec<String>,
}

impl EvidenceRefs {
    pub fn new<I, S>(decision_refs: I, reflection_refs: I, audit_refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            decision_refs: normalize_refs(decision_refs),
            reflection_refs: normalize_refs(reflection_refs),
            audit_refs: normalize_refs(audit_refs),
        }
    }

    /// Re-apply set normalization (used for records read back from disk)
    pub fn normalized(&self) -> Self {
        Self::new(
            self.decision_refs.clone(),
            self.reflection_refs.clone(),
            self.audit_refs.clone(),
        )
    }
}

fn normalize_refs<I, S>(refs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    refs.into_iter()
        .map(|r| r.into().trim().to_string())
        .filter(|r| !r.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Format a timestamp the way every governance artifact stores it
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One ledger line. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub transition_id: String,
    pub from_mode: RolloutMode,
    pub to_mode: RolloutMode,
    pub changed_at: String,
    pub changed_by: String,
    pub reason: String,
    #[serde(default)]
    pub incident_ref: String,
    #[serde(flatten)]
    pub evidence: EvidenceRefs,
}

/// Fields hashed into the transition id (everything but the id itself)
#[derive(Serialize)]
struct TransitionIdInput<'a> {
    from_mode: RolloutMode,
    to_mode: RolloutMode,
    changed_at: &'a str,
    changed_by: &'a str,
    reason: &'a str,
    incident_ref: &'a str,
    decision_refs: &'a [String],
    reflection_refs: &'a [String],
    audit_refs: &'a [String],
}

impl TransitionRecord {
    /// Build a record and stamp its deterministic id
    pub fn new(
        from_mode: RolloutMode,
        to_mode: RolloutMode,
        changed_at: DateTime<Utc>,
        changed_by: impl Into<String>,
        reason: impl Into<String>,
        incident_ref: impl Into<String>,
        evidence: EvidenceRefs,
    ) -> Self {
        let mut record = Self {
            transition_id: String::new(),
            from_mode,
            to_mode,
            changed_at: format_timestamp(changed_at),
            changed_by: changed_by.into().trim().to_string(),
            reason: reason.into().trim().to_string(),
            incident_ref: incident_ref.into().trim().to_string(),
            evidence: evidence.normalized(),
        };
        record.transition_id = record.compute_id();
        record
    }

    /// Recompute the id from the record's own fields.
    ///
    /// The input is serialized through `serde_json::Value`, whose object map
    /// keeps keys sorted, so the encoding is canonical.
    pub fn compute_id(&self) -> String {
        let input = TransitionIdInput {
            from_mode: self.from_mode,
            to_mode: self.to_mode,
            changed_at: &self.changed_at,
            changed_by: &self.changed_by,
            reason: &self.reason,
            incident_ref: &self.incident_ref,
            decision_refs: &self.evidence.decision_refs,
            reflection_refs: &self.evidence.reflection_refs,
            audit_refs: &self.evidence.audit_refs,
        };
        let canonical = serde_json::to_value(&input)
            .map(|v| v.to_string())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("sha256:{:x}", hasher.finalize())
    }

    pub fn has_valid_id(&self) -> bool {
        self.transition_id == self.compute_id()
    }
}

/// Cached projection of the ledger head
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutState {
    pub version: String,
    pub mode: RolloutMode,
    pub updated_at: String,
    pub updated_by: String,
    pub reason: String,
    #[serde(default)]
    pub last_transition_id: Option<String>,
    #[serde(flatten)]
    pub evidence: EvidenceRefs,
}

impl RolloutState {
    /// Cold-start state used when nothing has been persisted yet
    pub fn initial() -> Self {
        Self {
            version: STATE_SCHEMA_VERSION.to_string(),
            mode: RolloutMode::Experimental,
            updated_at: format_timestamp(Utc::now()),
            updated_by: "cortex-coach".to_string(),
            reason: "rollout_mode_uninitialized".to_string(),
            last_transition_id: None,
            evidence: EvidenceRefs::default(),
        }
    }

    /// Project a ledger record into state
    pub fn from_transition(record: &TransitionRecord) -> Self {
        Self {
            version: STATE_SCHEMA_VERSION.to_string(),
            mode: record.to_mode,
            updated_at: record.changed_at.clone(),
            updated_by: record.changed_by.clone(),
            reason: record.reason.clone(),
            last_transition_id: Some(record.transition_id.clone()),
            evidence: record.evidence.clone(),
        }
    }
}
