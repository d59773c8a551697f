//! `rollout-mode`: read the current rollout mode or propose a transition

use crate::lock::ProjectLock;
use crate::models::{CoachConfig, EvidenceRefs, GovernancePaths, RolloutMode};
use crate::state::{GovernanceStore, ProposeOutcome, RolloutSnapshot, StoreError, TransitionRequest};
use crate::validator::Violation;
use crate::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;

use super::{CommandOutput, CommandStatus, LockArgs, OutputFormat};

pub const COMMAND: &str = "rollout-mode";

#[derive(Args, Debug, Clone)]
pub struct RolloutModeArgs {
    /// Project directory containing .cortex/
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Transition to this mode (off, experimental, default)
    #[arg(long)]
    pub set_mode: Option<RolloutMode>,

    /// Who is making the change
    #[arg(long, default_value = "")]
    pub changed_by: String,

    /// Why the change is being made
    #[arg(long, default_value = "")]
    pub reason: String,

    /// Incident reference (required when rolling back out of default)
    #[arg(long, default_value = "")]
    pub incident_ref: String,

    /// Decision evidence (repeatable; required for default)
    #[arg(long = "decision-ref")]
    pub decision_refs: Vec<String>,

    /// Reflection evidence (repeatable; required for default)
    #[arg(long = "reflection-ref")]
    pub reflection_refs: Vec<String>,

    /// Audit evidence (repeatable; required for default)
    #[arg(long = "audit-ref")]
    pub audit_refs: Vec<String>,

    #[command(flatten)]
    pub lock: LockArgs,
}

pub fn run(args: &RolloutModeArgs) -> Result<CommandStatus> {
    let output = execute(args)?;
    output.emit(args.format)?;
    Ok(output.status)
}

/// Read or transition, returning what would be printed
pub fn execute(args: &RolloutModeArgs) -> Result<CommandOutput> {
    let paths = GovernancePaths::for_project(&args.project_dir);
    let store = GovernanceStore::open(paths.clone());

    let Some(to_mode) = args.set_mode else {
        return Ok(render_read(&store.inspect()?));
    };

    let config = CoachConfig::load(&paths)?;
    let options = args.lock.options(&config.lock, COMMAND)?;
    let request = TransitionRequest::new(to_mode, args.changed_by.as_str(), args.reason.as_str())
        .incident_ref(args.incident_ref.as_str())
        .evidence(EvidenceRefs::new(
            args.decision_refs.clone(),
            args.reflection_refs.clone(),
            args.audit_refs.clone(),
        ));

    let outcome = ProjectLock::scoped(&paths, &options, |lock| {
        Ok::<_, anyhow::Error>(store.propose(lock, &request))
    })?;

    match outcome {
        Ok(outcome) => Ok(render_transition(&outcome)),
        Err(StoreError::PolicyViolation { violations }) => Ok(render_rejection(to_mode, violations)),
        Err(e) => Err(e.into()),
    }
}

fn render_read(snapshot: &RolloutSnapshot) -> CommandOutput {
    let state = &snapshot.effective;
    let mut output = CommandOutput::new(
        COMMAND,
        CommandStatus::Pass,
        json!({
            "mode": state.mode,
            "changed": false,
            "state": state,
            "transition": null,
            "drift": snapshot.drift,
        }),
    );

    output.line(format!("{}", "Rollout mode".cyan().bold()));
    output.line(format!("   Mode:       {}", colored_mode(state.mode)));
    output.line(format!("   Updated:    {} by {}", state.updated_at, state.updated_by));
    output.line(format!("   Reason:     {}", state.reason));
    if let Some(id) = &state.last_transition_id {
        output.line(format!("   Transition: {}", id));
    }
    if let Some(drift) = snapshot.drift {
        output.line(format!(
            "{}",
            format!("⚠️  State file out of date ({}); showing ledger head", drift.as_str()).yellow()
        ));
    }
    output
}

fn render_transition(outcome: &ProposeOutcome) -> CommandOutput {
    let mut output = CommandOutput::new(
        COMMAND,
        CommandStatus::Pass,
        json!({
            "mode": outcome.state.mode,
            "changed": outcome.changed,
            "state": outcome.state,
            "transition": outcome.transition,
            "drift": null,
        }),
    );

    match &outcome.transition {
        Some(record) => {
            output.line(format!(
                "{} {} → {}",
                "✅ Rollout mode changed:".green(),
                colored_mode(record.from_mode),
                colored_mode(record.to_mode)
            ));
            output.line(format!("   Transition: {}", record.transition_id));
        }
        None => output.line(format!(
            "{} {}",
            "Rollout mode already".bright_black(),
            colored_mode(outcome.state.mode)
        )),
    }
    output
}

fn render_rejection(to_mode: RolloutMode, violations: Vec<Violation>) -> CommandOutput {
    let mut output = CommandOutput::new(
        COMMAND,
        CommandStatus::Fail,
        json!({
            "requested_mode": to_mode,
            "changed": false,
        }),
    );

    output.line(format!(
        "{}",
        format!("⛔ Transition to {} rejected", to_mode).red().bold()
    ));
    for violation in &violations {
        output.line(format!("   - {}: {}", violation.code.as_str().red(), violation.message));
    }
    output.with_violations(violations)
}

fn colored_mode(mode: RolloutMode) -> String {
    match mode {
        RolloutMode::Off => mode.as_str().bright_black().to_string(),
        RolloutMode::Experimental => mode.as_str().yellow().to_string(),
        RolloutMode::Default => mode.as_str().green().bold().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::EXIT_POLICY;
    use tempfile::TempDir;

    fn args(project_dir: &std::path::Path) -> RolloutModeArgs {
        RolloutModeArgs {
            project_dir: project_dir.to_path_buf(),
            format: OutputFormat::Json,
            set_mode: None,
            changed_by: String::new(),
            reason: String::new(),
            incident_ref: String::new(),
            decision_refs: Vec::new(),
            reflection_refs: Vec::new(),
            audit_refs: Vec::new(),
            lock: LockArgs::default(),
        }
    }

    #[test]
    fn test_read_without_state() {
        let temp = TempDir::new().unwrap();
        let output = execute(&args(temp.path())).unwrap();

        assert_eq!(output.status, CommandStatus::Pass);
        assert_eq!(output.envelope()["result"]["mode"], "experimental");
        assert!(!temp.path().join(".cortex/.lock").exists());
    }

    #[test]
    fn test_set_mode_then_read() {
        let temp = TempDir::new().unwrap();
        let mut set = args(temp.path());
        set.set_mode = Some(RolloutMode::Off);
        set.changed_by = "ops".to_string();
        set.reason = "pause".to_string();

        let output = execute(&set).unwrap();
        assert_eq!(output.status, CommandStatus::Pass);
        assert_eq!(output.result["changed"], true);
        assert!(!temp.path().join(".cortex/.lock").exists());

        let read = execute(&args(temp.path())).unwrap();
        assert_eq!(read.result["mode"], "off");
    }

    #[test]
    fn test_rejection_is_policy_failure() {
        let temp = TempDir::new().unwrap();
        let mut set = args(temp.path());
        set.set_mode = Some(RolloutMode::Default);
        set.changed_by = "ops".to_string();
        set.reason = "promote".to_string();
        set.reflection_refs = vec!["r1".to_string()];
        set.audit_refs = vec!["a1".to_string()];

        let output = execute(&set).unwrap();
        assert_eq!(output.status.exit_code(), EXIT_POLICY);
        let envelope = output.envelope();
        assert_eq!(envelope["status"], "fail");
        assert_eq!(
            envelope["violations"][0]["code"],
            "missing_decision_refs_for_default"
        );
    }
}
