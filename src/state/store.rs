//! GovernanceStore - rollout mode state and ledger persistence

use crate::ledger::{JsonlLedger, LedgerError, LedgerReader, LedgerWriter};
use crate::lock::ProjectLock;
use crate::models::{EvidenceRefs, GovernancePaths, RolloutMode, RolloutState, TransitionRecord};
use crate::utils::write_json_atomic;
use crate::validator::{self, ProposedTransition, Violation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The transition broke one or more policy rules; nothing was written
    #[error("policy_violation: {}", format_violations(.violations))]
    PolicyViolation { violations: Vec<Violation> },

    #[error(
        "lock for {} does not cover governance root {}",
        .lock_root.display(),
        .store_root.display()
    )]
    LockScopeMismatch {
        lock_root: PathBuf,
        store_root: PathBuf,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn violations(&self) -> Option<&[Violation]> {
        match self {
            StoreError::PolicyViolation { violations } => Some(violations),
            _ => None,
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.code.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Requests and results
// =============================================================================

/// A requested mode change with its justification
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub to_mode: RolloutMode,
    pub changed_by: String,
    pub reason: String,
    pub incident_ref: String,
    pub evidence: EvidenceRefs,
    /// Defaults to now
    pub changed_at: Option<DateTime<Utc>>,
}

impl TransitionRequest {
    pub fn new(to_mode: RolloutMode, changed_by: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            to_mode,
            changed_by: changed_by.into(),
            reason: reason.into(),
            incident_ref: String::new(),
            evidence: EvidenceRefs::default(),
            changed_at: None,
        }
    }

    pub fn incident_ref(mut self, incident_ref: impl Into<String>) -> Self {
        self.incident_ref = incident_ref.into();
        self
    }

    pub fn evidence(mut self, evidence: EvidenceRefs) -> Self {
        self.evidence = evidence.normalized();
        self
    }

    pub fn changed_at(mut self, at: DateTime<Utc>) -> Self {
        self.changed_at = Some(at);
        self
    }

    fn as_proposed(&self) -> ProposedTransition<'_> {
        ProposedTransition {
            to_mode: self.to_mode,
            changed_by: &self.changed_by,
            reason: &self.reason,
            incident_ref: &self.incident_ref,
            evidence: &self.evidence,
        }
    }
}

/// Result of an accepted `propose`
#[derive(Debug, Clone, Serialize)]
pub struct ProposeOutcome {
    /// False when the requested mode was already current
    pub changed: bool,
    pub state: RolloutState,
    pub transition: Option<TransitionRecord>,
}

/// How the cached state file disagrees with the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateDrift {
    /// Ledger has records but no state file exists
    ProjectionMissing,
    /// The state file exists but cannot be parsed
    ProjectionUnreadable,
    /// The state file points at a transition other than the ledger head
    ProjectionBehindLedger,
    /// The state file cites a transition but the ledger is empty
    ProjectionWithoutLedger,
}

impl StateDrift {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateDrift::ProjectionMissing => "projection_missing",
            StateDrift::ProjectionUnreadable => "projection_unreadable",
            StateDrift::ProjectionBehindLedger => "projection_behind_ledger",
            StateDrift::ProjectionWithoutLedger => "projection_without_ledger",
        }
    }
}

/// Cached state, ledger head, and the state reconciled from both
#[derive(Debug, Clone, Serialize)]
pub struct RolloutSnapshot {
    pub cached: Option<RolloutState>,
    pub ledger_head: Option<TransitionRecord>,
    /// What `read` returns: the ledger head's projection when they disagree
    pub effective: RolloutState,
    pub drift: Option<StateDrift>,
}

enum CachedState {
    Missing,
    Unreadable,
    Present(RolloutState),
}

// =============================================================================
// Store
// =============================================================================

/// Rollout mode store for one governance root.
///
/// Reads are lock-free. The only mutation, [`GovernanceStore::propose`],
/// takes the caller's [`ProjectLock`] as proof the project is locked.
#[derive(Debug, Clone)]
pub struct GovernanceStore<L = JsonlLedger> {
    paths: GovernancePaths,
    ledger: L,
}

impl GovernanceStore<JsonlLedger> {
    /// Store backed by the ledger file under the governance root
    pub fn open(paths: GovernancePaths) -> Self {
        let ledger = JsonlLedger::new(paths.ledger_file());
        Self { paths, ledger }
    }
}

impl<L: LedgerReader + LedgerWriter> GovernanceStore<L> {
    pub fn with_ledger(paths: GovernancePaths, ledger: L) -> Self {
        Self { paths, ledger }
    }

    pub fn paths(&self) -> &GovernancePaths {
        &self.paths
    }

    /// Current rollout state, reconciled to the ledger head. Never writes.
    pub fn read(&self) -> Result<RolloutState, StoreError> {
        Ok(self.inspect()?.effective)
    }

    /// Compare the cached state file with the ledger head
    pub fn inspect(&self) -> Result<RolloutSnapshot, StoreError> {
        let cached = self.read_cached()?;
        let ledger_head = self.ledger.head()?;

        let (effective, drift) = match (&cached, &ledger_head) {
            (CachedState::Present(state), Some(head)) => {
                if state.last_transition_id.as_deref() == Some(head.transition_id.as_str()) {
                    (state.clone(), None)
                } else {
                    (
                        RolloutState::from_transition(head),
                        Some(StateDrift::ProjectionBehindLedger),
                    )
                }
            }
            (CachedState::Missing, Some(head)) => (
                RolloutState::from_transition(head),
                Some(StateDrift::ProjectionMissing),
            ),
            (CachedState::Unreadable, Some(head)) => (
                RolloutState::from_transition(head),
                Some(StateDrift::ProjectionUnreadable),
            ),
            (CachedState::Present(state), None) => {
                if state.last_transition_id.is_some() {
                    (RolloutState::initial(), Some(StateDrift::ProjectionWithoutLedger))
                } else {
                    (state.clone(), None)
                }
            }
            (CachedState::Missing, None) => (RolloutState::initial(), None),
            (CachedState::Unreadable, None) => {
                (RolloutState::initial(), Some(StateDrift::ProjectionUnreadable))
            }
        };

        if let Some(drift) = drift {
            tracing::warn!(
                drift = drift.as_str(),
                state = %self.paths.state_file().display(),
                "rollout state projection disagrees with ledger; using ledger"
            );
        }

        let cached = match cached {
            CachedState::Present(state) => Some(state),
            _ => None,
        };
        Ok(RolloutSnapshot {
            cached,
            ledger_head,
            effective,
            drift,
        })
    }

    /// Request a mode change.
    ///
    /// A request for the current mode succeeds with `changed = false` and
    /// appends nothing. Otherwise the request is validated, appended to the
    /// ledger, and only then projected into the state file.
    pub fn propose(
        &self,
        lock: &ProjectLock,
        request: &TransitionRequest,
    ) -> Result<ProposeOutcome, StoreError> {
        self.check_lock_scope(lock)?;

        let snapshot = self.inspect()?;
        let current = snapshot.effective;

        if request.to_mode == current.mode {
            if snapshot.drift.is_some() {
                self.write_state(&current)?;
            }
            tracing::debug!(mode = %current.mode, "rollout mode unchanged");
            return Ok(ProposeOutcome {
                changed: false,
                state: current,
                transition: None,
            });
        }

        let violations = validator::validate(current.mode, &request.as_proposed());
        if !violations.is_empty() {
            return Err(StoreError::PolicyViolation { violations });
        }

        let record = TransitionRecord::new(
            current.mode,
            request.to_mode,
            request.changed_at.unwrap_or_else(Utc::now),
            request.changed_by.as_str(),
            request.reason.as_str(),
            request.incident_ref.as_str(),
            request.evidence.clone(),
        );

        self.ledger.append(&record)?;
        let state = RolloutState::from_transition(&record);
        self.write_state(&state)?;

        tracing::info!(
            from = %record.from_mode,
            to = %record.to_mode,
            changed_by = %record.changed_by,
            transition_id = %record.transition_id,
            "rollout mode transition recorded"
        );
        Ok(ProposeOutcome {
            changed: true,
            state,
            transition: Some(record),
        })
    }

    /// Rewrite the state file from the ledger head if they disagree
    pub fn repair_projection(&self, lock: &ProjectLock) -> Result<Option<StateDrift>, StoreError> {
        self.check_lock_scope(lock)?;
        let snapshot = self.inspect()?;
        if snapshot.drift.is_some() {
            self.write_state(&snapshot.effective)?;
        }
        Ok(snapshot.drift)
    }

    fn check_lock_scope(&self, lock: &ProjectLock) -> Result<(), StoreError> {
        if same_path(lock.root(), self.paths.root()) {
            Ok(())
        } else {
            Err(StoreError::LockScopeMismatch {
                lock_root: lock.root().to_path_buf(),
                store_root: self.paths.root().to_path_buf(),
            })
        }
    }

    fn read_cached(&self) -> Result<CachedState, StoreError> {
        let path = self.paths.state_file();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CachedState::Missing),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path,
                    source,
                })
            }
        };

        match serde_json::from_str::<RolloutState>(&content) {
            Ok(state) => Ok(CachedState::Present(state)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable rollout state file");
                Ok(CachedState::Unreadable)
            }
        }
    }

    fn write_state(&self, state: &RolloutState) -> Result<(), StoreError> {
        let path = self.paths.state_file();
        write_json_atomic(&path, state).map_err(|source| StoreError::Io {
            action: "write",
            path,
            source,
        })
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

// =============================================================================
// Tests
// =============================================================================
