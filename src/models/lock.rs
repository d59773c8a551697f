use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rollout::format_timestamp;

/// Contents of `.cortex/.lock` while a command holds the project lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Opaque holder identity: `<pid>-<epoch_millis>-<uuid>`
    pub token: String,
    pub owner_process_id: u32,
    /// RFC 3339 acquisition time
    pub created_at: String,
    /// Acquisition time in epoch seconds, used for the age check
    pub created_epoch: f64,
    pub command_name: String,
}

impl LockRecord {
    /// Record for the current process, acquired now
    pub fn for_current_process(command_name: impl Into<String>) -> Self {
        let now = Utc::now();
        let pid = std::process::id();
        Self {
            token: format!("{}-{}-{}", pid, now.timestamp_millis(), uuid::Uuid::new_v4()),
            owner_process_id: pid,
            created_at: format_timestamp(now),
            created_epoch: epoch_seconds(now),
            command_name: command_name.into(),
        }
    }

    /// Seconds elapsed since acquisition (negative if the clock went backwards)
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        epoch_seconds(now) - self.created_epoch
    }
}

pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_within_a_process() {
        let a = LockRecord::for_current_process("rollout-mode");
        let b = LockRecord::for_current_process("rollout-mode");
        assert_ne!(a.token, b.token);
        assert_eq!(a.owner_process_id, std::process::id());
        assert!(a.token.starts_with(&format!("{}-", std::process::id())));
    }

    #[test]
    fn test_age_seconds() {
        let mut record = LockRecord::for_current_process("test");
        record.created_epoch -= 42.0;
        let age = record.age_seconds(Utc::now());
        assert!(age >= 42.0 && age < 60.0, "unexpected age {}", age);
    }
}
