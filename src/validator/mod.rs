pub mod transition;

pub use transition::{validate, validate_record, ProposedTransition, Violation, ViolationCode};
