//! Tool Execution Subsystem
//!
//! Runs allow-listed system tools without ever involving a shell.
//!
//! # Security Features
//!
//! - **Command Whitelisting**: only commands in the [`CommandRegistry`] run,
//!   from their pinned absolute path, with allow-listed or validated tokens
//! - **List Invocation**: argv is handed to the OS verbatim, never to `sh -c`
//! - **Timeout Enforcement**: SIGTERM to the process group, then SIGKILL
//! - **Resource Limits**: per-child address-space and CPU-time ceilings,
//!   bounded output capture, capped concurrency
//! - **Privileged Runs**: `sudo -S` with the cached credential on stdin
//!
//! # Architecture
//!
//! - `registry.rs`: allowed commands and argument authorization
//! - `executor.rs`: slot accounting, outcome mapping and auditing
//! - `runner.rs`: spawning and supervising one child
//! - `limits.rs`: per-execution limits and presets
//! - `cancel.rs`: caller-side cancellation
//! - `outcome.rs`: the closed set of results
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deckguard_executor::audit::{AuditSink, MemoryAuditSink};
//! use deckguard_executor::tools::{
//!     CommandRegistry, ExecuteOptions, ExecutionRequest, ExecutorConfig, SafeExecutor,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let audit: Arc<dyn AuditSink> = Arc::new(MemoryAuditSink::new());
//!     let registry = Arc::new(CommandRegistry::builtin()?);
//!     let executor = SafeExecutor::new(registry, audit, ExecutorConfig::default());
//!
//!     let request = ExecutionRequest::new("nmap", ["-sn", "192.168.1.0/24"]);
//!     let outcome = executor.execute(&request, ExecuteOptions::default()).await;
//!     println!("{}", outcome.summary());
//!
//!     Ok(())
//! }
//! ```

mod cancel;
mod executor;
mod limits;
mod outcome;
mod registry;
mod runner;

pub use cancel::CancelHandle;
pub use executor::{
    ExecuteOptions, ExecutionRequest, ExecutorConfig, OverflowPolicy, SafeExecutor,
    DEFAULT_MAX_IN_FLIGHT, SUDO_COMMAND,
};
pub use limits::{
    memory_mb_to_bytes, ExecutionLimits, DEFAULT_KILL_GRACE, DEFAULT_MAX_OUTPUT, DEFAULT_MEMORY_LIMIT,
    DEFAULT_TIMEOUT, MAX_MEMORY_LIMIT_MB,
};
pub use outcome::{ExecutionOutcome, ProcessOutput, RejectReason};
pub use registry::{default_commands, to_args, AllowedCommandSpec, ArgumentKind, CommandRegistry};
pub use runner::{
    LaunchRequest, ProcessLauncher, ResourceBoundedRunner, RunOutcome, StdinInput, CHILD_PATH,
};
