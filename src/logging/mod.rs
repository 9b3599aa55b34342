//! Logging infrastructure for Lapidary
//!
//! Security-relevant events (fail-open validations, speedboost
//! displacements, dropped slot entries) go to a JSONL audit trail in
//! addition to tracing.

pub mod audit;

pub use audit::{AuditEvent, AuditKind, AuditLogger};
