//! `rollout-mode-audit`: replay the transition ledger and persist the report

use crate::audit::LedgerAuditor;
use crate::models::{AuditReport, AuditStatus, CoachConfig, GovernancePaths};
use crate::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::{Path, PathBuf};

use super::{CommandOutput, CommandStatus, OutputFormat};

pub const COMMAND: &str = "rollout-mode-audit";

#[derive(Args, Debug, Clone)]
pub struct RolloutAuditArgs {
    /// Project directory containing .cortex/
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Where to write the report (default from coach.toml, relative to .cortex/)
    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

pub fn run(args: &RolloutAuditArgs) -> Result<CommandStatus> {
    let output = execute(args)?;
    output.emit(args.format)?;
    Ok(output.status)
}

pub fn execute(args: &RolloutAuditArgs) -> Result<CommandOutput> {
    let paths = GovernancePaths::for_project(&args.project_dir);
    let config = CoachConfig::load(&paths)?;
    let report_path = match &args.report_path {
        Some(path) => path.clone(),
        None => paths.resolve(&config.audit.report_path),
    };

    let report = LedgerAuditor::for_paths(&paths).run_and_persist(&report_path)?;
    Ok(render(&report, &report_path))
}

fn render(report: &AuditReport, report_path: &Path) -> CommandOutput {
    let status = match report.status {
        AuditStatus::Pass => CommandStatus::Pass,
        AuditStatus::Fail => CommandStatus::Fail,
    };
    let summary = &report.summary;

    let mut output = CommandOutput::new(
        COMMAND,
        status,
        json!({
            "status": report.status,
            "report_path": report_path.display().to_string(),
            "transition_count": summary.transition_count,
            "complete_transition_count": summary.complete_transition_count,
            "finding_count": summary.finding_count,
            "transition_completeness_rate": summary.transition_completeness_rate,
            "state_mode": report.state.state_mode,
            "ledger_mode": report.state.ledger_mode,
            "state_consistent": report.state.consistent,
            "findings": report.findings,
        }),
    );

    let headline = match report.status {
        AuditStatus::Pass => "✅ Rollout ledger audit passed".green().bold(),
        AuditStatus::Fail => "❌ Rollout ledger audit failed".red().bold(),
    };
    output.line(headline.to_string());
    output.line(format!(
        "   Transitions: {} ({} complete, rate {:.2})",
        summary.transition_count, summary.complete_transition_count, summary.transition_completeness_rate
    ));
    output.line(format!("   Findings:    {}", summary.finding_count));
    for finding in &report.findings {
        output.line(format!(
            "   - line {}: {} {}",
            finding.line,
            finding.code.red(),
            finding.message
        ));
    }
    if !report.state.consistent {
        output.line(format!(
            "{}",
            "⚠️  State file does not match the ledger head (advisory)".yellow()
        ));
    }
    output.line(format!("   Report:      {}", report_path.display()));
    output
}
