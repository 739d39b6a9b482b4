// Deckguard - Main Entry Point
//
// Command-line front end for the secure executor:
// - exec: run an allow-listed command under limits
// - validate: check a single UI field
// - commands: list the command registry
// - drop-privileges: give up root

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deckguard_executor::config::Config;
use deckguard_executor::logging::{self, LogLevel};
use deckguard_executor::metrics;
use deckguard_executor::security::{FieldKind, SecurityContext};
use deckguard_executor::tools::{
    memory_mb_to_bytes, CancelHandle, ExecuteOptions, ExecutionOutcome, ExecutionRequest, MAX_MEMORY_LIMIT_MB,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const EXIT_OTHER: u8 = 1;
const EXIT_REJECTED: u8 = 2;
const EXIT_LIMIT: u8 = 3;
const EXIT_SPAWN: u8 = 4;

/// Deckguard: allow-listed command execution for handheld security tooling
#[derive(Parser, Debug)]
#[command(name = "deckguard")]
#[command(version)]
#[command(about = "Validated, audited, resource-bounded execution of system tools", long_about = None)]
struct Args {
    /// Configuration file (default: ~/.config/deckguard/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an allow-listed command
    Exec {
        /// Timeout in seconds (default from config)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_secs: Option<u64>,

        /// Address-space ceiling in MiB (default from config)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_MEMORY_LIMIT_MB))]
        memory_mb: Option<u64>,

        /// Print the outcome as JSON instead of the child's output
        #[arg(long)]
        json: bool,

        /// Run through sudo, reading its password from the first line of stdin
        #[arg(long)]
        sudo: bool,

        /// Print this run's metrics in Prometheus text format to stderr
        #[arg(long)]
        metrics: bool,

        /// Registered command name
        command: String,

        /// Arguments, passed through verbatim
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Validate one input field and print the accepted value
    Validate {
        /// Field kind: target, mac, name, filename, port_range, interface
        kind: FieldKind,

        /// Raw input
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// List registered commands
    Commands,
    /// Drop root to the configured (or given) identity
    DropPrivileges {
        #[arg(long, requires = "gid")]
        uid: Option<u32>,

        #[arg(long, requires = "uid")]
        gid: Option<u32>,
    },
}

/// Flags for one `exec` run
#[derive(Debug, Clone, Copy)]
struct ExecFlags {
    timeout_secs: Option<u64>,
    memory_mb: Option<u64>,
    json: bool,
    sudo: bool,
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = logging::with_bootstrap_logging(|| match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    })?;
    if args.verbose {
        config.logging.level = LogLevel::Debug;
    }

    let _log_guard = config.logging.init()?;
    metrics::init().context("Failed to register metrics")?;

    info!("Deckguard v{} starting", env!("CARGO_PKG_VERSION"));

    let context = SecurityContext::from_config(&config)?;

    let code = match args.command {
        Commands::Exec {
            timeout_secs,
            memory_mb,
            json,
            sudo,
            metrics,
            command,
            args,
        } => {
            let flags = ExecFlags {
                timeout_secs,
                memory_mb,
                json,
                sudo,
                metrics,
            };
            exec(&context, command, args, flags).await?
        }
        Commands::Validate { kind, value } => validate(&context, kind, &value),
        Commands::Commands => list_commands(&context),
        Commands::DropPrivileges { uid, gid } => drop_privileges(&context, uid.zip(gid))?,
    };

    Ok(code)
}

/// Run one command and map its outcome to an exit code
async fn exec(context: &SecurityContext, command: String, args: Vec<String>, flags: ExecFlags) -> Result<ExitCode> {
    let cancel = CancelHandle::new();
    let mut options = ExecuteOptions::default().with_cancel(cancel.clone());
    if let Some(secs) = flags.timeout_secs {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    if let Some(mb) = flags.memory_mb {
        let bytes = memory_mb_to_bytes(mb)
            .with_context(|| format!("Memory limit must be 1-{} MiB, got {}", MAX_MEMORY_LIMIT_MB, mb))?;
        options = options.with_memory_limit(bytes);
    }
    if flags.sudo {
        cache_stdin_credential(context).await?;
    }

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, terminating child");
            cancel.cancel();
        }
    });

    let request = ExecutionRequest::new(command, args);
    let outcome = if flags.sudo {
        context.execute_privileged(&request, options).await
    } else {
        context.executor().execute(&request, options).await
    };
    interrupt.abort();
    if flags.sudo {
        context.credentials().clear();
    }

    debug!("{} -> {}", request.command, outcome.kind());

    if flags.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
        );
    } else {
        match &outcome {
            ExecutionOutcome::Success { stdout, stderr, .. } => {
                print!("{}", stdout);
                eprint!("{}", stderr);
            }
            other => eprintln!("deckguard: {}", other.summary()),
        }
    }

    if flags.metrics {
        eprint!("{}", metrics::gather()?);
    }

    Ok(ExitCode::from(exit_code(&outcome)))
}

/// Cache the first line of stdin as the elevation password.
async fn cache_stdin_credential(context: &SecurityContext) -> Result<()> {
    let mut line = Zeroizing::new(String::with_capacity(256));
    BufReader::new(tokio::io::stdin())
        .read_line(&mut *line)
        .await
        .context("Failed to read password from stdin")?;

    let secret = line.trim_end_matches(['\r', '\n']);
    if secret.is_empty() {
        warn!("No password on stdin; privileged execution will be rejected");
        return Ok(());
    }
    context
        .credentials()
        .set_default(secret.as_bytes().to_vec())
        .context("Failed to cache credential")?;
    Ok(())
}

fn exit_code(outcome: &ExecutionOutcome) -> u8 {
    match outcome {
        ExecutionOutcome::Success { exit_code: 0, .. } => 0,
        ExecutionOutcome::Success { .. } => EXIT_OTHER,
        ExecutionOutcome::Rejected { .. } => EXIT_REJECTED,
        ExecutionOutcome::Timeout { .. } | ExecutionOutcome::ResourceExceeded { .. } => EXIT_LIMIT,
        ExecutionOutcome::SpawnError { .. } => EXIT_SPAWN,
    }
}

fn validate(context: &SecurityContext, kind: FieldKind, value: &str) -> ExitCode {
    let outcome = context.validator().validate(kind, value);
    match (outcome.value(), outcome.reason()) {
        (Some(value), _) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        (None, reason) => {
            eprintln!("deckguard: invalid {}: {}", kind, reason.unwrap_or("rejected"));
            ExitCode::from(EXIT_REJECTED)
        }
    }
}

fn list_commands(context: &SecurityContext) -> ExitCode {
    for spec in context.registry().iter() {
        let arguments: Vec<&str> = spec.allowed_arguments.iter().map(String::as_str).collect();
        let values: Vec<&str> = spec.value_kinds.iter().map(|kind| kind.field().as_str()).collect();
        println!(
            "{}\t{}\t[{}]\t[{}]",
            spec.name,
            spec.absolute_path.display(),
            arguments.join(" "),
            values.join(" ")
        );
    }
    ExitCode::SUCCESS
}

fn drop_privileges(context: &SecurityContext, target: Option<(u32, u32)>) -> Result<ExitCode> {
    let (uid, gid) = target.unwrap_or_else(|| context.drop_target());
    let outcome = match target {
        Some((uid, gid)) => context.privileges().drop_to(uid, gid),
        None => context.drop_privileges(),
    }
    .with_context(|| format!("Failed to drop privileges to {}:{}", uid, gid))?;
    println!("{}", outcome.as_str());
    Ok(ExitCode::SUCCESS)
}
