use crate::models::TransitionRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{LedgerEntry, LedgerError, LedgerIter, LedgerReader, LedgerWriter};

/// Line-delimited JSON ledger file: one self-contained record per line
#[derive(Debug, Clone)]
pub struct JsonlLedger {
    path: PathBuf,
}

impl JsonlLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, action: &'static str) -> impl FnOnce(io::Error) -> LedgerError + '_ {
        move |source| LedgerError::Io {
            action,
            path: self.path.clone(),
            source,
        }
    }
}

impl LedgerWriter for JsonlLedger {
    fn append(&self, record: &TransitionRecord) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(self.io_error("create directory for"))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(self.io_error("open"))?;
        if ends_mid_line(&mut file).map_err(self.io_error("read"))? {
            // A torn tail from an interrupted append stays its own line
            tracing::warn!(path = %self.path.display(), "ledger ends without newline");
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())
            .map_err(self.io_error("append to"))?;
        file.flush().map_err(self.io_error("flush"))?;
        file.sync_all().map_err(self.io_error("sync"))?;

        tracing::debug!(
            path = %self.path.display(),
            transition_id = %record.transition_id,
            "appended ledger record"
        );
        Ok(())
    }
}

/// True when the file is non-empty and its last byte is not a newline
fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl LedgerReader for JsonlLedger {
    fn scan(&self) -> Result<LedgerIter<'_>, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Box::new(std::iter::empty())),
            Err(e) => return Err(self.io_error("open")(e)),
        };

        let path = self.path.clone();
        let entries = BufReader::new(file)
            .lines()
            .enumerate()
            .filter_map(move |(index, line)| match line {
                Ok(raw) => LedgerEntry::parse(index + 1, &raw).map(Ok),
                Err(source) if source.kind() == io::ErrorKind::InvalidData => {
                    // Non UTF-8 bytes: surface as an unparsable line, keep scanning
                    LedgerEntry::parse(index + 1, "\u{fffd}").map(Ok)
                }
                Err(source) => Some(Err(LedgerError::Io {
                    action: "read",
                    path: path.clone(),
                    source,
                })),
            });
        Ok(Box::new(entries))
    }
}

/// In-memory ledger holding raw lines, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryLedger {
    lines: Mutex<Vec<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with raw lines, valid or not
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
        }
    }

    pub fn push_raw(&self, line: impl Into<String>) {
        self.lock_lines().push(line.into());
    }

    fn lock_lines(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LedgerWriter for MemoryLedger {
    fn append(&self, record: &TransitionRecord) -> Result<(), LedgerError> {
        let line = serde_json::to_string(record)?;
        self.lock_lines().push(line);
        Ok(())
    }
}

impl LedgerReader for MemoryLedger {
    fn scan(&self) -> Result<LedgerIter<'_>, LedgerError> {
        let snapshot = self.lock_lines().clone();
        let entries = snapshot
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| LedgerEntry::parse(index + 1, &raw).map(Ok));
        Ok(Box::new(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerLine;
    use crate::models::{EvidenceRefs, RolloutMode};
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(from: RolloutMode, to: RolloutMode, reason: &str) -> TransitionRecord {
        TransitionRecord::new(from, to, Utc::now(), "tester", reason, "", EvidenceRefs::default())
    }

    #[test]
    fn test_missing_file_scans_empty() {
        let temp = TempDir::new().unwrap();
        let ledger = JsonlLedger::new(temp.path().join("state/ledger.jsonl"));
        assert_eq!(ledger.scan().unwrap().count(), 0);
        assert!(ledger.head().unwrap().is_none());
    }

    #[test]
    fn test_append_creates_one_line_per_record() {
        let temp = TempDir::new().unwrap();
        let ledger = JsonlLedger::new(temp.path().join("state/ledger.jsonl"));

        let first = record(RolloutMode::Experimental, RolloutMode::Off, "pause");
        let second = record(RolloutMode::Off, RolloutMode::Experimental, "resume");
        ledger.append(&first).unwrap();
        ledger.append(&second).unwrap();

        let content = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));

        let entries: Vec<_> = ledger.scan().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record(), Some(&first));
        assert_eq!(entries[1].line, 2);
        assert_eq!(ledger.head().unwrap(), Some(second));
    }

    #[test]
    fn test_scan_keeps_going_past_garbage() {
        let temp = TempDir::new().unwrap();
        let ledger = JsonlLedger::new(temp.path().join("ledger.jsonl"));
        let good = record(RolloutMode::Experimental, RolloutMode::Off, "pause");
        ledger.append(&good).unwrap();

        let mut file = OpenOptions::new().append(true).open(ledger.path()).unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file).unwrap();
        drop(file);
        ledger.append(&good).unwrap();

        let entries: Vec<_> = ledger.scan().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[1].content, LedgerLine::InvalidJson { .. }));
        assert_eq!(entries[2].line, 4);
    }

    #[test]
    fn test_append_after_torn_tail_starts_new_line() {
        let temp = TempDir::new().unwrap();
        let ledger = JsonlLedger::new(temp.path().join("ledger.jsonl"));
        let first = record(RolloutMode::Experimental, RolloutMode::Off, "pause");
        ledger.append(&first).unwrap();

        let mut file = OpenOptions::new().append(true).open(ledger.path()).unwrap();
        write!(file, "{{\"transition_id\":\"sha256:ab").unwrap();
        drop(file);

        let second = record(RolloutMode::Off, RolloutMode::Experimental, "resume");
        ledger.append(&second).unwrap();

        let entries: Vec<_> = ledger.scan().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[1].content, LedgerLine::InvalidJson { .. }));
        assert_eq!(entries[2].record(), Some(&second));
        assert_eq!(ledger.head().unwrap(), Some(second));
    }

    #[test]
    fn test_memory_ledger_roundtrip() {
        let ledger = MemoryLedger::new();
        let r = record(RolloutMode::Experimental, RolloutMode::Default, "promote");
        ledger.append(&r).unwrap();
        ledger.push_raw("{}");

        assert_eq!(ledger.scan().unwrap().count(), 2);
        assert_eq!(ledger.head().unwrap(), Some(r));
    }
}
