//! Rollout Ledger Audit Module
//!
//! Read-only replay of the transition ledger. Every malformed line, policy
//! violation and structural inconsistency becomes a finding; the result is
//! persisted as the mode transition audit report.

mod auditor;

pub use auditor::{codes, persist_report, AuditError, LedgerAuditor};
