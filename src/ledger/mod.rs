//! Rollout Transition Ledger
//!
//! The append-only history of rollout mode transitions. Storage sits behind
//! [`LedgerWriter`] / [`LedgerReader`] so the store and the auditor never
//! touch the file format directly.

mod jsonl;

pub use jsonl::{JsonlLedger, MemoryLedger};

use crate::models::TransitionRecord;
use std::path::PathBuf;

/// Errors raised by ledger storage
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Failed to {action} ledger {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize transition record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What a single non-blank ledger line turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerLine {
    Record(TransitionRecord),
    /// Not a JSON object at all
    InvalidJson { error: String },
    /// A JSON object that does not deserialize as a transition record
    InvalidRecord { error: String },
}

/// A ledger line with its 1-indexed position
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub line: usize,
    pub content: LedgerLine,
}

impl LedgerEntry {
    /// Classify one raw line; blank lines yield `None`
    pub fn parse(line: usize, raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let content = match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) if value.is_object() => match serde_json::from_value(value) {
                Ok(record) => LedgerLine::Record(record),
                Err(e) => LedgerLine::InvalidRecord {
                    error: e.to_string(),
                },
            },
            Ok(_) => LedgerLine::InvalidJson {
                error: "ledger line is not a JSON object".to_string(),
            },
            Err(e) => LedgerLine::InvalidJson {
                error: e.to_string(),
            },
        };
        Some(Self { line, content })
    }

    pub fn record(&self) -> Option<&TransitionRecord> {
        match &self.content {
            LedgerLine::Record(record) => Some(record),
            _ => None,
        }
    }
}

pub type LedgerIter<'a> = Box<dyn Iterator<Item = Result<LedgerEntry, LedgerError>> + 'a>;

/// Durable append of one record
pub trait LedgerWriter {
    /// Append `record`; the write is durable when this returns `Ok`
    fn append(&self, record: &TransitionRecord) -> Result<(), LedgerError>;
}

/// Top-to-bottom scan of the ledger
pub trait LedgerReader {
    fn scan(&self) -> Result<LedgerIter<'_>, LedgerError>;

    /// Last line that parsed as a transition record
    fn head(&self) -> Result<Option<TransitionRecord>, LedgerError> {
        let mut head = None;
        for entry in self.scan()? {
            if let LedgerLine::Record(record) = entry?.content {
                head = Some(record);
            }
        }
        Ok(head)
    }
}
