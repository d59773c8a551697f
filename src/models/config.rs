use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LOCK_TIMEOUT_SECONDS: f64 = 10.0;
pub const DEFAULT_LOCK_STALE_SECONDS: f64 = 300.0;
pub const DEFAULT_LOCK_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_AUDIT_REPORT_PATH: &str =
    "reports/project_state/phase5_mode_transition_audit_report_v0.json";

// =============================================================================
// Governance root layout
// =============================================================================

/// Well-known file locations under a project's `.cortex/` directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernancePaths {
    root: PathBuf,
}

impl GovernancePaths {
    pub const ROOT_DIR: &'static str = ".cortex";

    /// Resolve the governance root for a project directory
    pub fn for_project(project_dir: impl AsRef<Path>) -> Self {
        Self {
            root: project_dir.as_ref().join(Self::ROOT_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state/rollout_mode_v0.json")
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.root.join("state/rollout_mode_transitions_v0.jsonl")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("coach.toml")
    }

    /// Resolve a path relative to the governance root (absolute paths pass through)
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }
}

// =============================================================================
// Coach configuration
// =============================================================================

/// Lock timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Total time to wait for the lock
    pub timeout_seconds: f64,
    /// Maximum hold age before a lock is reclaimable
    pub stale_seconds: f64,
    /// Sleep between acquisition attempts
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_LOCK_TIMEOUT_SECONDS,
            stale_seconds: DEFAULT_LOCK_STALE_SECONDS,
            poll_interval_ms: DEFAULT_LOCK_POLL_INTERVAL_MS,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or_default()
    }

    pub fn stale_after(&self) -> Duration {
        Duration::try_from_secs_f64(self.stale_seconds).unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Audit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Report location, relative to the governance root
    pub report_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from(DEFAULT_AUDIT_REPORT_PATH),
        }
    }
}

/// Coach configuration, read from `.cortex/coach.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoachConfig {
    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl CoachConfig {
    /// Load config; a missing file yields the defaults
    pub fn load(paths: &GovernancePaths) -> anyhow::Result<Self> {
        let config_path = paths.config_file();
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: CoachConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        check_seconds("lock.timeout_seconds", self.lock.timeout_seconds)?;
        check_seconds("lock.stale_seconds", self.lock.stale_seconds)?;
        Ok(())
    }
}

pub fn check_seconds(name: &str, value: f64) -> anyhow::Result<()> {
    if !value.is_finite() || value < 0.0 {
        bail!("{} must be a non-negative number of seconds, got {}", name, value);
    }
    Ok(())
}
