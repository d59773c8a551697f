//! `lock-status`: show who holds the project lock

use crate::lock;
use crate::models::{CoachConfig, GovernancePaths};
use crate::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use super::{CommandOutput, CommandStatus, OutputFormat};

pub const COMMAND: &str = "lock-status";

#[derive(Args, Debug, Clone)]
pub struct LockStatusArgs {
    /// Project directory containing .cortex/
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Stale threshold to judge the holder against, in seconds
    #[arg(long)]
    pub lock_stale_seconds: Option<f64>,
}

pub fn run(args: &LockStatusArgs) -> Result<CommandStatus> {
    let output = execute(args)?;
    output.emit(args.format)?;
    Ok(output.status)
}

pub fn execute(args: &LockStatusArgs) -> Result<CommandOutput> {
    let paths = GovernancePaths::for_project(&args.project_dir);
    let config = CoachConfig::load(&paths)?;
    let stale_after = match args.lock_stale_seconds {
        Some(seconds) => Duration::try_from_secs_f64(seconds)?,
        None => config.lock.stale_after(),
    };

    let inspection = lock::inspect(&paths, stale_after)?;
    let mut output = CommandOutput::new(COMMAND, CommandStatus::Pass, serde_json::to_value(&inspection)?);

    match (&inspection.holder, inspection.locked) {
        (_, false) => output.line(format!("{}", "🔓 Project is not locked".green())),
        (Some(holder), true) => {
            output.line(format!("{}", "🔒 Project lock held".yellow().bold()));
            output.line(format!("   Command: {}", holder.command_name));
            output.line(format!("   PID:     {}", holder.owner_process_id));
            output.line(format!("   Since:   {}", holder.created_at));
        }
        (None, true) => output.line(format!("{}", "🔒 Lock file present but unreadable".yellow())),
    }
    if let Some(reason) = inspection.stale_reason {
        output.line(format!("   Stale:   {}", reason.as_str().red()));
    }
    Ok(output)
}
