//! Rendering of command results as coloured text or a JSON envelope

use crate::validator::Violation;
use crate::Result;
use clap::ValueEnum;
use serde_json::{json, Value};

use super::{EXIT_OK, EXIT_POLICY};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Pass/fail of a command that completed without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Pass,
    /// Policy outcome: rejected transition or failed audit
    Fail,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pass => "pass",
            CommandStatus::Fail => "fail",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CommandStatus::Pass => EXIT_OK,
            CommandStatus::Fail => EXIT_POLICY,
        }
    }
}

/// Everything a command has to say, in both renderings
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: &'static str,
    pub status: CommandStatus,
    pub result: Value,
    pub violations: Vec<Violation>,
    text: Vec<String>,
}

impl CommandOutput {
    pub fn new(command: &'static str, status: CommandStatus, result: Value) -> Self {
        Self {
            command,
            status,
            result,
            violations: Vec::new(),
            text: Vec::new(),
        }
    }

    pub fn with_violations(mut self, violations: Vec<Violation>) -> Self {
        self.violations = violations;
        self
    }

    /// Append a line to the text rendering
    pub fn line(&mut self, line: impl Into<String>) {
        self.text.push(line.into());
    }

    /// The JSON shape parsed by downstream gates and cadence packs
    pub fn envelope(&self) -> Value {
        json!({
            "status": self.status.as_str(),
            "command": self.command,
            "result": self.result,
            "violations": self.violations,
        })
    }

    pub fn emit(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&self.envelope())?);
            }
            OutputFormat::Text => {
                for line in &self.text {
                    println!("{}", line);
                }
            }
        }
        Ok(())
    }
}
