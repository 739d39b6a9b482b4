//! Resource-bounded process runner.
//!
//! Starts one child directly from an argv array (no shell), with its address
//! space capped by `RLIMIT_AS` and its CPU time by `RLIMIT_CPU` from inside
//! the child before `exec`, and waits for it under a wall-clock deadline. On timeout or cancellation the
//! child's whole process group gets SIGTERM, then SIGKILL after the grace
//! period.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::cancel::CancelHandle;
use super::limits::ExecutionLimits;

/// `PATH` seen by children. Tools that shell out internally still resolve
/// against system directories only.
pub const CHILD_PATH: &str = "/usr/sbin:/usr/bin:/sbin:/bin";

const READ_CHUNK: usize = 8192;

/// stderr fragments that mean the child ran out of address space.
const ALLOCATION_FAILURE_MARKERS: &[&str] = &[
    "Cannot allocate memory",
    "cannot allocate",
    "failed to map segment",
    "out of memory",
    "Out of memory",
    "memory allocation of",
    "std::bad_alloc",
    "MemoryError",
];

/// Bytes fed to the child's stdin, wiped when dropped and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct StdinInput(Zeroizing<Vec<u8>>);

impl StdinInput {
    pub fn new(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for StdinInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StdinInput([redacted; {} bytes])", self.0.len())
    }
}

/// One fully authorized process to start.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// `argv[0]` is the absolute path of the executable.
    pub argv: Vec<String>,
    pub limits: ExecutionLimits,
    pub cancel: Option<CancelHandle>,
    /// Written to a piped stdin, which is then closed. Without it the
    /// child's stdin is `/dev/null`.
    pub stdin: Option<StdinInput>,
}

impl LaunchRequest {
    pub fn new(argv: Vec<String>, limits: ExecutionLimits) -> Self {
        Self {
            argv,
            limits,
            cancel: None,
            stdin: None,
        }
    }
}

/// What happened to the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The child exited on its own. A child killed by a signal we did not
    /// send reports `128 + signal`.
    Exited {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    TimedOut { cancelled: bool },
    ResourceExceeded { message: String },
    SpawnFailed { message: String },
}

/// Process creation seam. The executor only ever talks to this trait, so
/// tests can observe exactly what would have been started.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> RunOutcome;
}

/// The real launcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceBoundedRunner;

impl ResourceBoundedRunner {
    pub fn new() -> Self {
        Self
    }

    /// Spawn `argv` and wait for it within `limits`.
    pub async fn spawn(
        &self,
        argv: &[String],
        limits: &ExecutionLimits,
        cancel: Option<&CancelHandle>,
    ) -> RunOutcome {
        self.spawn_with_input(argv, limits, cancel, None).await
    }

    /// Like [`spawn`](Self::spawn), feeding `stdin` to the child first.
    pub async fn spawn_with_input(
        &self,
        argv: &[String],
        limits: &ExecutionLimits,
        cancel: Option<&CancelHandle>,
        stdin: Option<StdinInput>,
    ) -> RunOutcome {
        let Some((program, args)) = argv.split_first() else {
            return RunOutcome::SpawnFailed {
                message: "empty argv".to_string(),
            };
        };

        let mut command = build_command(program, args, limits, stdin.is_some());
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.raw_os_error() == Some(Errno::ENOMEM as i32) => {
                warn!("{} could not start within its memory limit: {}", program, e);
                return RunOutcome::ResourceExceeded {
                    message: format!("{}: {}", program, e),
                };
            }
            Err(e) => {
                warn!("Failed to spawn {}: {}", program, e);
                return RunOutcome::SpawnFailed {
                    message: format!("{}: {}", program, e),
                };
            }
        };

        let pgid = child.id().map(|pid| pid as i32);
        debug!("Spawned {} (pid {:?})", program, pgid);

        let stdout = Capture::start(child.stdout.take(), limits.max_output_bytes);
        let stderr = Capture::start(child.stderr.take(), limits.max_output_bytes);
        let feeder = stdin.and_then(|input| feed(child.stdin.take(), input));

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = tokio::time::sleep(limits.timeout) => Ending::Terminated { cancelled: false },
            _ = wait_cancelled(cancel) => Ending::Terminated { cancelled: true },
        };

        let status = match ending {
            Ending::Exited(status) => status,
            Ending::Terminated { cancelled } => {
                if cancelled {
                    debug!("{} cancelled by caller", program);
                } else {
                    warn!("{} timed out after {:?}", program, limits.timeout);
                }
                terminate(&mut child, pgid, limits.kill_grace).await;
                stdout.abort();
                stderr.abort();
                if let Some(feeder) = feeder {
                    feeder.abort();
                }
                return RunOutcome::TimedOut { cancelled };
            }
        };

        // Stragglers in the group can hold the pipes open after the
        // child itself has gone.
        if !drain(&stdout, &stderr, limits.kill_grace).await {
            signal_group(pgid, Signal::SIGKILL);
            stdout.abort();
            stderr.abort();
        }
        if let Some(feeder) = feeder {
            feeder.abort();
        }
        let stdout = stdout.finish();
        let stderr = stderr.finish();

        match status {
            Ok(status) => classify(status, stdout, stderr),
            Err(e) => RunOutcome::SpawnFailed {
                message: format!("failed to wait for {}: {}", program, e),
            },
        }
    }
}

#[async_trait]
impl ProcessLauncher for ResourceBoundedRunner {
    async fn launch(&self, request: LaunchRequest) -> RunOutcome {
        self.spawn_with_input(
            &request.argv,
            &request.limits,
            request.cancel.as_ref(),
            request.stdin,
        )
        .await
    }
}

enum Ending {
    Exited(io::Result<ExitStatus>),
    Terminated { cancelled: bool },
}

fn build_command(program: &str, args: &[String], limits: &ExecutionLimits, piped_stdin: bool) -> Command {
    let memory_limit = limits.memory_limit_bytes;
    let (cpu_soft, cpu_hard) = limits.cpu_limit_secs();

    let mut command = Command::new(program);
    command
        .args(args)
        .env_clear()
        .env("PATH", CHILD_PATH)
        .env("LANG", "C")
        .stdin(if piped_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    // SAFETY: the hook runs between fork and exec and only calls setrlimit,
    // which is async-signal-safe and touches no shared state.
    unsafe {
        command.pre_exec(move || {
            setrlimit(Resource::RLIMIT_AS, memory_limit, memory_limit).map_err(io::Error::from)?;
            setrlimit(Resource::RLIMIT_CPU, cpu_soft, cpu_hard).map_err(io::Error::from)
        });
    }
    command
}

/// Write `input` to the child's stdin in the background, then close it.
fn feed(pipe: Option<tokio::process::ChildStdin>, input: StdinInput) -> Option<JoinHandle<()>> {
    let mut pipe = pipe?;
    Some(tokio::spawn(async move {
        if let Err(e) = pipe.write_all(input.as_bytes()).await {
            debug!("Child closed stdin early: {}", e);
        }
        let _ = pipe.shutdown().await;
    }))
}

async fn wait_cancelled(cancel: Option<&CancelHandle>) {
    match cancel {
        Some(handle) => handle.cancelled().await,
        None => std::future::pending().await,
    }
}

/// SIGTERM the group, give it `grace`, then SIGKILL whatever is left.
async fn terminate(child: &mut Child, pgid: Option<i32>, grace: Duration) {
    signal_group(pgid, Signal::SIGTERM);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => signal_group(pgid, Signal::SIGKILL),
        Err(_) => {
            warn!("Child ignored SIGTERM for {:?}, sending SIGKILL", grace);
            signal_group(pgid, Signal::SIGKILL);
            let _ = child.start_kill();
            if let Err(e) = child.wait().await {
                warn!("Failed to reap killed child: {}", e);
            }
        }
    }
}

fn signal_group(pgid: Option<i32>, signal: Signal) {
    let Some(pgid) = pgid else { return };
    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {} to process group {}: {}", signal, pgid, e),
    }
}

fn classify(status: ExitStatus, stdout: String, stderr: String) -> RunOutcome {
    let allocation_failure = ALLOCATION_FAILURE_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker));

    if let Some(signal) = status.signal() {
        // Nothing on this path has signalled the child, so a SIGKILL came
        // from the kernel. SIGXCPU is the soft CPU-time limit.
        if signal == Signal::SIGKILL as i32 || signal == Signal::SIGXCPU as i32 || allocation_failure {
            return RunOutcome::ResourceExceeded {
                message: format!("terminated by signal {}", signal),
            };
        }
        return RunOutcome::Exited {
            stdout,
            stderr,
            exit_code: 128 + signal,
        };
    }

    let exit_code = status.code().unwrap_or(-1);
    if exit_code != 0 && allocation_failure {
        return RunOutcome::ResourceExceeded {
            message: format!("allocation failure (exit code {})", exit_code),
        };
    }

    RunOutcome::Exited {
        stdout,
        stderr,
        exit_code,
    }
}

#[derive(Debug, Default)]
struct Captured {
    data: Vec<u8>,
    dropped: u64,
}

impl Captured {
    fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!("\n[output truncated: {} bytes dropped]", self.dropped));
        }
        text
    }
}

/// Background reader for one pipe. Keeps the first `limit` bytes, counts
/// the rest, and keeps reading so the child never blocks on a full pipe.
struct Capture {
    buf: Arc<Mutex<Captured>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(pipe: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Captured::default()));
        let task = pipe.map(|mut pipe| {
            let buf = Arc::clone(&buf);
            tokio::spawn(async move {
                let mut chunk = [0u8; READ_CHUNK];
                loop {
                    let n = match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    let mut captured = buf.lock().unwrap_or_else(|p| p.into_inner());
                    let room = limit.saturating_sub(captured.data.len());
                    let keep = n.min(room);
                    captured.data.extend_from_slice(&chunk[..keep]);
                    captured.dropped += (n - keep) as u64;
                }
            })
        });
        Self { buf, task }
    }

    fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    fn finish(self) -> String {
        let captured = std::mem::take(&mut *self.buf.lock().unwrap_or_else(|p| p.into_inner()));
        captured.into_string()
    }
}

/// Wait up to `grace` for both readers to hit EOF.
async fn drain(stdout: &Capture, stderr: &Capture, grace: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        if stdout.is_finished() && stderr.is_finished() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
