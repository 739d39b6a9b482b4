// Configuration File Support
//
// TOML configuration for the deckguard executor with `DECKGUARD_*`
// environment overrides. The default location is the user config
// directory: ~/.config/deckguard/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::security::{PathCategory, SafePaths, MAX_TTL};
use crate::tools::{
    memory_mb_to_bytes, AllowedCommandSpec, ArgumentKind, ExecutionLimits, ExecutorConfig, OverflowPolicy,
    MAX_MEMORY_LIMIT_MB,
};

/// File name of the audit trail inside the logs directory
pub const AUDIT_LOG_FILE: &str = "audit.log";

const MIB: u64 = 1024 * 1024;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Diagnostic logging
    pub logging: LoggingConfig,

    /// Audit trail
    pub audit: AuditConfig,

    /// Child process limits and concurrency
    pub executor: ExecutorSection,

    /// Credential cache
    pub credentials: CredentialsConfig,

    /// Privilege drop target
    pub privileges: PrivilegesConfig,

    /// Application directory layout
    pub paths: PathsConfig,

    /// Command allow-list; the built-in table is used when empty
    pub commands: BTreeMap<String, CommandEntry>,
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// Audit file (default: `<base_dir>/logs/audit.log`)
    pub path: Option<PathBuf>,

    /// Rotate once the file would exceed this size
    pub max_bytes: u64,

    /// Rotated files to keep
    pub backups: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_bytes: MIB,
            backups: 2,
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorSection {
    /// Default wall-clock limit per command
    pub timeout_secs: u64,

    /// Default address-space ceiling per command
    pub memory_limit_mb: u64,

    /// Children allowed to run at once
    pub max_in_flight: usize,

    /// block or reject when every slot is taken
    pub overflow: OverflowPolicy,

    /// Time between SIGTERM and SIGKILL
    pub kill_grace_secs: u64,

    /// Captured bytes kept per stream
    pub max_output_bytes: usize,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            memory_limit_mb: 256,
            max_in_flight: 10,
            overflow: OverflowPolicy::Block,
            kill_grace_secs: 5,
            max_output_bytes: 10 * MIB as usize,
        }
    }
}

/// Credential cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Lifetime of a cached secret when none is given
    pub ttl_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self { ttl_secs: 900 }
    }
}

/// Privilege drop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrivilegesConfig {
    pub uid: u32,
    pub gid: u32,
}

impl Default for PrivilegesConfig {
    fn default() -> Self {
        Self { uid: 1000, gid: 1000 }
    }
}

/// Directory layout configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of logs/, cache/, exports/, captures/ and config/
    pub base_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base_dir = dirs::data_local_dir()
            .map(|dir| dir.join("deckguard"))
            .unwrap_or_else(|| PathBuf::from(".deckguard"));
        Self { base_dir }
    }
}

/// One `[commands.<name>]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CommandEntry {
    /// Absolute path of the executable
    pub path: PathBuf,

    /// Exact tokens the command accepts
    pub allowed_arguments: BTreeSet<String>,

    /// Value kinds admitted after validation
    pub value_kinds: BTreeSet<ArgumentKind>,
}

impl Config {
    /// Load configuration from the default path
    ///
    /// # Returns
    ///
    /// Returns the loaded configuration, or defaults if no file exists.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields defaults. Environment overrides are applied
    /// before validation in both cases.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("deckguard"))
            .unwrap_or_else(|| PathBuf::from(".deckguard"))
            .join("config.toml")
    }

    /// Apply `DECKGUARD_*` environment overrides
    ///
    /// Values that fail to parse or are out of range are ignored with a
    /// warning and the file value is kept.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("DECKGUARD_LOG_LEVEL") {
            match level.parse::<LogLevel>() {
                Ok(level) => self.logging.level = level,
                Err(e) => tracing::warn!("Ignoring DECKGUARD_LOG_LEVEL: {}", e),
            }
        }

        if let Ok(format) = std::env::var("DECKGUARD_LOG_FORMAT") {
            match format.parse::<LogFormat>() {
                Ok(format) => self.logging.format = format,
                Err(e) => tracing::warn!("Ignoring DECKGUARD_LOG_FORMAT: {}", e),
            }
        }

        if let Ok(dir) = std::env::var("DECKGUARD_LOG_DIR") {
            if !dir.is_empty() {
                self.logging.dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(secs) = env_number::<u64>("DECKGUARD_TIMEOUT_SECS", |v| *v > 0) {
            self.executor.timeout_secs = secs;
        }

        if let Some(mb) = env_number::<u64>("DECKGUARD_MEMORY_MB", |v| {
            *v > 0 && *v <= MAX_MEMORY_LIMIT_MB
        }) {
            self.executor.memory_limit_mb = mb;
        }

        if let Some(n) = env_number::<usize>("DECKGUARD_MAX_IN_FLIGHT", |v| *v > 0) {
            self.executor.max_in_flight = n;
        }

        if let Some(secs) = env_number::<u64>("DECKGUARD_CREDENTIAL_TTL_SECS", |v| {
            *v > 0 && *v <= MAX_TTL.as_secs()
        }) {
            self.credentials.ttl_secs = secs;
        }

        self
    }

    /// Validate configuration values
    ///
    /// # Returns
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.executor.timeout_secs == 0 {
            anyhow::bail!("Executor timeout must be > 0 seconds");
        }
        if self.executor.memory_limit_mb == 0 {
            anyhow::bail!("Executor memory limit must be > 0 MB");
        }
        if self.executor.memory_limit_mb > MAX_MEMORY_LIMIT_MB {
            anyhow::bail!(
                "Executor memory limit must be <= {} MB, got {}",
                MAX_MEMORY_LIMIT_MB,
                self.executor.memory_limit_mb
            );
        }
        if self.executor.max_in_flight == 0 {
            anyhow::bail!("Executor max_in_flight must be > 0");
        }
        if self.executor.max_output_bytes == 0 {
            anyhow::bail!("Executor max_output_bytes must be > 0");
        }

        if self.credentials.ttl_secs == 0 {
            anyhow::bail!("Credential TTL must be > 0 seconds");
        }
        if self.credentials.ttl_secs > MAX_TTL.as_secs() {
            anyhow::bail!(
                "Credential TTL must be <= {} seconds, got {}",
                MAX_TTL.as_secs(),
                self.credentials.ttl_secs
            );
        }

        if self.audit.max_bytes == 0 {
            anyhow::bail!("Audit max_bytes must be > 0");
        }
        if self.logging.max_bytes == 0 {
            anyhow::bail!("Logging max_bytes must be > 0");
        }

        if self.paths.base_dir.as_os_str().is_empty() {
            anyhow::bail!("paths.base_dir must not be empty");
        }

        for (name, entry) in &self.commands {
            if entry.path.as_os_str().is_empty() {
                anyhow::bail!("Command '{}' has no path configured", name);
            }
            if !entry.path.is_absolute() {
                anyhow::bail!("Command '{}' path must be absolute: {:?}", name, entry.path);
            }
        }

        Ok(())
    }

    /// Default per-execution limits
    ///
    /// An out-of-range memory limit (rejected by [`Config::validate`]) is
    /// clamped to the largest allowed ceiling, never to unlimited.
    pub fn limits(&self) -> ExecutionLimits {
        let memory_limit_bytes = memory_mb_to_bytes(self.executor.memory_limit_mb)
            .unwrap_or(MAX_MEMORY_LIMIT_MB * MIB);
        ExecutionLimits {
            timeout: Duration::from_secs(self.executor.timeout_secs),
            memory_limit_bytes,
            kill_grace: Duration::from_secs(self.executor.kill_grace_secs),
            max_output_bytes: self.executor.max_output_bytes,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_in_flight: self.executor.max_in_flight,
            overflow: self.executor.overflow,
            limits: self.limits(),
        }
    }

    /// Configured allow-list entries as registry specs
    pub fn command_specs(&self) -> Vec<AllowedCommandSpec> {
        self.commands
            .iter()
            .map(|(name, entry)| AllowedCommandSpec {
                name: name.clone(),
                absolute_path: entry.path.clone(),
                allowed_arguments: entry.allowed_arguments.clone(),
                value_kinds: entry.value_kinds.clone(),
            })
            .collect()
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credentials.ttl_secs)
    }

    pub fn safe_paths(&self) -> SafePaths {
        SafePaths::new(&self.paths.base_dir)
    }

    /// Location of the audit trail
    pub fn audit_path(&self) -> PathBuf {
        self.audit
            .path
            .clone()
            .unwrap_or_else(|| self.safe_paths().dir(PathCategory::Logs).join(AUDIT_LOG_FILE))
    }
}

fn env_number<T: std::str::FromStr>(key: &str, accept: impl Fn(&T) -> bool) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) if accept(&value) => Some(value),
        _ => {
            tracing::warn!("Ignoring {}={:?}: out of range or not a number", key, raw);
            None
        }
    }
}
