//! Execution outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SecurityError;

/// Why a request never reached process creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    UnknownCommand { command: String },
    ArgumentNotPermitted { command: String, argument: String },
    CapacityExhausted { limit: usize },
    /// A privileged run was asked for with no live cached credential.
    CredentialUnavailable,
}

impl RejectReason {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCommand { .. } => "unknown_command",
            Self::ArgumentNotPermitted { .. } => "argument_not_permitted",
            Self::CapacityExhausted { .. } => "capacity_exhausted",
            Self::CredentialUnavailable => "credential_unavailable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand { command } => write!(f, "unknown command '{}'", command),
            Self::ArgumentNotPermitted { command, argument } => {
                write!(f, "argument not permitted for '{}': {:?}", command, argument)
            }
            Self::CapacityExhausted { limit } => {
                write!(f, "too many commands running (limit {})", limit)
            }
            Self::CredentialUnavailable => write!(f, "no valid cached credential for privileged execution"),
        }
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Result of one `SafeExecutor::execute` call.
///
/// A non-zero exit status is still `Success`: the program ran and exited on
/// its own. Interpreting the exit code is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    /// The child was terminated by the executor, either at its deadline or
    /// because the caller cancelled it.
    Timeout { cancelled: bool },
    /// The child died on its memory ceiling.
    ResourceExceeded { message: String },
    Rejected { reason: RejectReason },
    SpawnError { message: String },
}

impl ExecutionOutcome {
    /// Short machine-readable label, used in audit records and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Timeout { cancelled: false } => "timeout",
            Self::Timeout { cancelled: true } => "cancelled",
            Self::ResourceExceeded { .. } => "resource_exceeded",
            Self::Rejected { .. } => "rejected",
            Self::SpawnError { .. } => "spawn_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { exit_code: 0, .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Success { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Convert into a `Result` so callers can use `?`.
    pub fn into_result(self) -> Result<ProcessOutput, SecurityError> {
        match self {
            Self::Success {
                stdout,
                stderr,
                exit_code,
            } => Ok(ProcessOutput {
                stdout,
                stderr,
                exit_code,
            }),
            Self::Timeout { cancelled: false } => {
                Err(SecurityError::ResourceLimitExceeded("timed out".to_string()))
            }
            Self::Timeout { cancelled: true } => {
                Err(SecurityError::ResourceLimitExceeded("cancelled".to_string()))
            }
            Self::ResourceExceeded { message } => Err(SecurityError::ResourceLimitExceeded(message)),
            Self::Rejected { reason } => match reason {
                RejectReason::CapacityExhausted { .. } => {
                    Err(SecurityError::ResourceLimitExceeded(reason.to_string()))
                }
                _ => Err(SecurityError::WhitelistViolation(reason.to_string())),
            },
            Self::SpawnError { message } => Err(SecurityError::SpawnError(message)),
        }
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        match self {
            Self::Success {
                stdout,
                stderr,
                exit_code,
            } => format!(
                "exited with code {} ({} bytes stdout, {} bytes stderr)",
                exit_code,
                stdout.len(),
                stderr.len()
            ),
            Self::Timeout { cancelled: false } => "timed out".to_string(),
            Self::Timeout { cancelled: true } => "cancelled".to_string(),
            Self::ResourceExceeded { message } => format!("resource limit exceeded: {}", message),
            Self::Rejected { reason } => format!("rejected: {}", reason),
            Self::SpawnError { message } => format!("failed to start: {}", message),
        }
    }
}
