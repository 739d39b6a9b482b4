//! Safe Executor
//!
//! Entry point for running an allow-listed command on behalf of a UI tool.
//! It checks the request against the [`CommandRegistry`], holds one of a
//! fixed number of execution slots while the child runs, and hands the argv
//! to a [`ProcessLauncher`]. Every call, whatever its outcome, leaves exactly
//! one COMMAND audit record.
//!
//! Privileged calls go through the registry's `sudo` entry with `-S`, and the
//! cached credential is written to the child's stdin. It is never placed in
//! argv, the environment, a log line or an audit detail.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::cancel::CancelHandle;
use super::limits::ExecutionLimits;
use super::outcome::{ExecutionOutcome, RejectReason};
use super::registry::CommandRegistry;
use super::runner::{LaunchRequest, ProcessLauncher, ResourceBoundedRunner, RunOutcome, StdinInput};
use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::metrics;
use crate::security::CredentialCache;

/// Default number of children allowed to run at once
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

/// Registry name of the elevation helper used by privileged calls
pub const SUDO_COMMAND: &str = "sudo";

/// Inserted between the helper and the authorized argv: read the password
/// from stdin, then stop option parsing.
const SUDO_FLAGS: &[&str] = &["-S", "--"];

/// A command name plus the caller's argument tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub command: String,
    pub args: Vec<String>,
}

impl ExecutionRequest {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Per-call overrides. Anything left unset uses the executor's defaults.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub timeout: Option<Duration>,
    pub memory_limit: Option<u64>,
    pub cancel: Option<CancelHandle>,
}

impl ExecuteOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// What to do with a request when every slot is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for a slot.
    #[default]
    Block,
    /// Return `Rejected(CapacityExhausted)` immediately.
    Reject,
}

/// Configuration for the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum concurrently running children (default: 10)
    pub max_in_flight: usize,

    /// Behaviour when `max_in_flight` is reached (default: block)
    pub overflow: OverflowPolicy,

    /// Default limits for each execution
    pub limits: ExecutionLimits,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            overflow: OverflowPolicy::default(),
            limits: ExecutionLimits::default(),
        }
    }
}

/// Orchestrates registry checks, slot accounting, launching and auditing.
///
/// # Example
///
/// ```ignore
/// let executor = SafeExecutor::new(registry, audit, ExecutorConfig::default());
/// let request = ExecutionRequest::new("nmap", ["-sn", "192.168.1.0/24"]);
/// match executor.execute(&request, ExecuteOptions::default()).await {
///     ExecutionOutcome::Success { stdout, .. } => println!("{}", stdout),
///     other => eprintln!("{}", other.summary()),
/// }
/// ```
#[derive(Clone)]
pub struct SafeExecutor {
    registry: Arc<CommandRegistry>,
    launcher: Arc<dyn ProcessLauncher>,
    audit: Arc<dyn AuditSink>,
    slots: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl SafeExecutor {
    /// Create an executor that starts real processes.
    pub fn new(registry: Arc<CommandRegistry>, audit: Arc<dyn AuditSink>, config: ExecutorConfig) -> Self {
        Self::with_launcher(registry, Arc::new(ResourceBoundedRunner::new()), audit, config)
    }

    pub fn with_launcher(
        registry: Arc<CommandRegistry>,
        launcher: Arc<dyn ProcessLauncher>,
        audit: Arc<dyn AuditSink>,
        config: ExecutorConfig,
    ) -> Self {
        let max_in_flight = config.max_in_flight.max(1);
        Self {
            registry,
            launcher,
            audit,
            slots: Arc::new(Semaphore::new(max_in_flight)),
            config: ExecutorConfig {
                max_in_flight,
                ..config
            },
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Number of children currently running through this executor.
    pub fn in_flight(&self) -> usize {
        self.config.max_in_flight - self.slots.available_permits()
    }

    /// Run one request to completion.
    ///
    /// Returns only once the child has exited or been killed. Rejections
    /// (unknown command, unlisted argument, no free slot) never reach
    /// process creation.
    pub async fn execute(&self, request: &ExecutionRequest, options: ExecuteOptions) -> ExecutionOutcome {
        self.run(request, options, None).await
    }

    /// Run one request with elevated privileges.
    ///
    /// The request is authorized exactly as in [`execute`](Self::execute),
    /// then started as `<sudo> -S -- <path> <args>` with the cached secret
    /// on stdin. Rejected without launching when the registry has no
    /// `sudo` entry or `credentials` holds no live secret.
    pub async fn execute_privileged(
        &self,
        request: &ExecutionRequest,
        credentials: &CredentialCache,
        options: ExecuteOptions,
    ) -> ExecutionOutcome {
        self.run(request, options, Some(credentials)).await
    }

    async fn run(
        &self,
        request: &ExecutionRequest,
        options: ExecuteOptions,
        elevation: Option<&CredentialCache>,
    ) -> ExecutionOutcome {
        let start = Instant::now();
        let id = Uuid::new_v4();
        let privileged = elevation.is_some();
        info!(
            "Executing [{}]{}: {}",
            id,
            if privileged { " (privileged)" } else { "" },
            describe(request)
        );

        let authorized = self
            .registry
            .authorize(&request.command, &request.args)
            .and_then(|argv| match elevation {
                Some(credentials) => self.elevate(argv, credentials).map(|(argv, input)| (argv, Some(input))),
                None => Ok((argv, None)),
            });
        let (argv, stdin) = match authorized {
            Ok(authorized) => authorized,
            Err(reason) => {
                warn!("Command rejected: {}", reason);
                return self.finish(request, id, privileged, ExecutionOutcome::Rejected { reason }, start);
            }
        };

        let _permit = match self.acquire_slot().await {
            Ok(permit) => permit,
            Err(reason) => {
                warn!("Command rejected: {}", reason);
                return self.finish(request, id, privileged, ExecutionOutcome::Rejected { reason }, start);
            }
        };

        let limits = self.limits_for(&options);
        debug!("Launching {:?} with {:?}", argv, limits);

        let _in_flight = metrics::InFlightGuard::new();
        let run = self
            .launcher
            .launch(LaunchRequest {
                argv,
                limits,
                cancel: options.cancel,
                stdin,
            })
            .await;

        self.finish(request, id, privileged, ExecutionOutcome::from(run), start)
    }

    /// Wrap an authorized argv in the `sudo` entry and take the secret.
    fn elevate(
        &self,
        argv: Vec<String>,
        credentials: &CredentialCache,
    ) -> Result<(Vec<String>, StdinInput), RejectReason> {
        let sudo = self
            .registry
            .get(SUDO_COMMAND)
            .ok_or_else(|| RejectReason::UnknownCommand {
                command: SUDO_COMMAND.to_string(),
            })?;

        let input = credentials
            .with_secret(|secret| {
                // Sized up front so the push never reallocates and strands
                // an unwiped copy.
                let mut line = Zeroizing::new(Vec::with_capacity(secret.len() + 1));
                line.extend_from_slice(secret);
                line.push(b'\n');
                StdinInput::new(line)
            })
            .ok_or(RejectReason::CredentialUnavailable)?;

        let mut elevated = Vec::with_capacity(argv.len() + SUDO_FLAGS.len() + 1);
        elevated.push(sudo.absolute_path.to_string_lossy().into_owned());
        elevated.extend(SUDO_FLAGS.iter().map(|flag| flag.to_string()));
        elevated.extend(argv);
        Ok((elevated, input))
    }

    fn limits_for(&self, options: &ExecuteOptions) -> ExecutionLimits {
        let mut limits = self.config.limits;
        if let Some(timeout) = options.timeout {
            limits.timeout = timeout;
        }
        if let Some(bytes) = options.memory_limit {
            limits.memory_limit_bytes = bytes;
        }
        limits
    }

    async fn acquire_slot(&self) -> Result<SemaphorePermit<'_>, RejectReason> {
        let exhausted = RejectReason::CapacityExhausted {
            limit: self.config.max_in_flight,
        };
        match self.config.overflow {
            OverflowPolicy::Block => self.slots.acquire().await.map_err(|_| exhausted),
            OverflowPolicy::Reject => self.slots.try_acquire().map_err(|e| match e {
                TryAcquireError::NoPermits | TryAcquireError::Closed => exhausted,
            }),
        }
    }

    fn finish(
        &self,
        request: &ExecutionRequest,
        id: Uuid,
        privileged: bool,
        outcome: ExecutionOutcome,
        start: Instant,
    ) -> ExecutionOutcome {
        let elapsed = start.elapsed();

        let mut event = AuditEvent::command(&request.command, AuditOutcome::from(outcome.is_success()))
            .with_detail("args", render_args(&request.args))
            .with_detail("outcome", outcome.kind())
            .with_detail("duration_ms", elapsed.as_millis())
            .with_detail("id", id);
        if let Some(spec) = self.registry.get(&request.command) {
            event = event.with_detail("path", spec.absolute_path.display());
        }
        if privileged {
            event = event.with_detail("privileged", true);
        }
        match &outcome {
            ExecutionOutcome::Success { exit_code, .. } => {
                event = event.with_detail("exit_code", exit_code);
            }
            ExecutionOutcome::Rejected { reason } => {
                event = event.with_detail("reason", reason.kind());
                if let RejectReason::ArgumentNotPermitted { argument, .. } = reason {
                    event = event.with_detail("argument", argument);
                }
            }
            ExecutionOutcome::ResourceExceeded { message } | ExecutionOutcome::SpawnError { message } => {
                event = event.with_detail("message", message);
            }
            ExecutionOutcome::Timeout { .. } => {}
        }
        self.audit.record(event);
        metrics::record_execution(outcome.kind(), elapsed);

        info!("[{}] {} {}", id, request.command, outcome.summary());
        outcome
    }
}

impl std::fmt::Debug for SafeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeExecutor")
            .field("commands", &self.registry.len())
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl From<RunOutcome> for ExecutionOutcome {
    fn from(run: RunOutcome) -> Self {
        match run {
            RunOutcome::Exited {
                stdout,
                stderr,
                exit_code,
            } => Self::Success {
                stdout,
                stderr,
                exit_code,
            },
            RunOutcome::TimedOut { cancelled } => Self::Timeout { cancelled },
            RunOutcome::ResourceExceeded { message } => Self::ResourceExceeded { message },
            RunOutcome::SpawnFailed { message } => Self::SpawnError { message },
        }
    }
}

/// Log-safe summary of a request (long argument lists are elided).
fn describe(request: &ExecutionRequest) -> String {
    if request.args.len() > 3 {
        format!("{} ... ({} args)", request.command, request.args.len())
    } else {
        format!("{} {:?}", request.command, request.args)
    }
}

/// Argument list as a JSON array, so token boundaries survive in the audit
/// record.
fn render_args(args: &[String]) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| format!("{:?}", args))
}
