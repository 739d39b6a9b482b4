//! Execution Limits
//!
//! Per-call bounds on a child process: wall-clock time, address space,
//! termination grace and captured output.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wall-clock timeout (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default address-space ceiling (256 MiB)
pub const DEFAULT_MEMORY_LIMIT: u64 = 256 * 1024 * 1024;

/// Largest configurable address-space ceiling in MiB (1 TiB)
pub const MAX_MEMORY_LIMIT_MB: u64 = 1024 * 1024;

/// Seconds of CPU time allowed beyond the wall-clock timeout before
/// `RLIMIT_CPU` sends SIGXCPU, and before the hard limit kills.
pub const CPU_SOFT_SLACK_SECS: u64 = 5;
pub const CPU_HARD_SLACK_SECS: u64 = 10;

const MIB: u64 = 1024 * 1024;

/// Time between SIGTERM and SIGKILL
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Default per-stream capture limit (10 MiB)
pub const DEFAULT_MAX_OUTPUT: usize = 10 * 1024 * 1024;

/// Resource bounds applied to one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Wall-clock time before the child is terminated
    pub timeout: Duration,

    /// `RLIMIT_AS` installed in the child before exec
    pub memory_limit_bytes: u64,

    /// Wait after SIGTERM before escalating to SIGKILL
    pub kill_grace: Duration,

    /// Captured bytes per stream; the rest is counted and dropped
    pub max_output_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT,
            kill_grace: DEFAULT_KILL_GRACE,
            max_output_bytes: DEFAULT_MAX_OUTPUT,
        }
    }
}

impl ExecutionLimits {
    /// Quick probes such as `iwconfig` (10 seconds)
    pub fn short() -> Self {
        Self::default().with_timeout(Duration::from_secs(10))
    }

    /// Most tools (30 seconds, default)
    pub fn medium() -> Self {
        Self::default()
    }

    /// Scans and captures (5 minutes)
    pub fn long() -> Self {
        Self::default().with_timeout(Duration::from_secs(300))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Longest an execution can take before the runner returns:
    /// the timeout plus the termination grace.
    pub fn deadline(&self) -> Duration {
        self.timeout.saturating_add(self.kill_grace)
    }

    /// `(soft, hard)` `RLIMIT_CPU` in seconds. A backstop for a wall-clock
    /// monitor that never fires.
    pub fn cpu_limit_secs(&self) -> (u64, u64) {
        let base = self.timeout.as_secs().max(1);
        (
            base.saturating_add(CPU_SOFT_SLACK_SECS),
            base.saturating_add(CPU_HARD_SLACK_SECS),
        )
    }
}

/// Convert a MiB count to bytes. `None` for zero or anything above
/// [`MAX_MEMORY_LIMIT_MB`].
pub fn memory_mb_to_bytes(mb: u64) -> Option<u64> {
    if mb == 0 || mb > MAX_MEMORY_LIMIT_MB {
        return None;
    }
    mb.checked_mul(MIB)
}
