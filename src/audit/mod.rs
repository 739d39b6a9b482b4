//! Security audit trail.
//!
//! Audit records are a separate stream from diagnostic logging: they are
//! written by an [`AuditSink`], never by a `tracing` layer, so log filters can
//! never suppress them. Every validation decision, command execution attempt
//! and privilege change produces exactly one [`AuditEvent`].

mod event;
mod rotating;
mod sink;

pub use event::{AuditCategory, AuditEvent, AuditOutcome};
pub use rotating::RotatingFile;
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink};
