//! Command handlers for the `cortex-coach` binary

pub mod lock_status;
pub mod output;
pub mod rollout_audit;
pub mod rollout_mode;

pub use output::{CommandOutput, CommandStatus, OutputFormat};

use crate::lock::LockOptions;
use crate::models::config::{check_seconds, LockConfig};
use crate::Result;
use clap::Args;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Process exit codes shared with the automation that shells out to us
pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_POLICY: i32 = 2;

/// Lock flags for mutating commands; unset flags fall back to `coach.toml`
#[derive(Args, Debug, Clone, Default)]
pub struct LockArgs {
    /// Max time to wait for the .cortex lock, in seconds
    #[arg(long)]
    pub lock_timeout_seconds: Option<f64>,

    /// Lock age after which it is treated as stale, in seconds
    #[arg(long)]
    pub lock_stale_seconds: Option<f64>,

    /// Take over the lock even if its holder looks alive
    #[arg(long)]
    pub force_unlock: bool,
}

impl LockArgs {
    pub fn options(&self, config: &LockConfig, command_name: &str) -> Result<LockOptions> {
        let mut options = LockOptions::from_config(config, command_name).force_takeover(self.force_unlock);
        if let Some(timeout) = self.lock_timeout_seconds {
            check_seconds("--lock-timeout-seconds", timeout)?;
            options = options.timeout(Duration::try_from_secs_f64(timeout)?);
        }
        if let Some(stale) = self.lock_stale_seconds {
            check_seconds("--lock-stale-seconds", stale)?;
            options = options.stale_after(Duration::try_from_secs_f64(stale)?);
        }
        Ok(options)
    }
}

/// Log filter from `RUST_LOG` when it is set and valid, else warn (debug with `--verbose`)
pub fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    if let Some(filter) = rust_log.and_then(|spec| EnvFilter::try_new(spec).ok()) {
        return filter;
    }
    EnvFilter::new(if verbose { "debug" } else { "warn" })
}
