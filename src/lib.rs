//! Deckguard Executor Library
//!
//! Secure command execution for a device UI that drives privileged system
//! tools: input validation, an allow-listed executor with resource limits,
//! a TTL-bounded credential cache, one-way privilege dropping and an
//! append-only audit trail.

pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod security;
pub mod tools;

pub use config::Config;
pub use error::{Result, SecurityError};
pub use security::SecurityContext;
