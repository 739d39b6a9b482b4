//! Command Registry
//!
//! The closed table of programs the executor may start. Each entry pins a
//! literal absolute path (never a `PATH` lookup) and the exact argument
//! tokens allowed with it. The table is checked once when it is built and is
//! read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::outcome::RejectReason;
use crate::error::RegistryError;
use crate::security::FieldKind;

/// Typed value a command may take in addition to its fixed tokens.
///
/// A value token is admitted only if the matching validator accepts it. It
/// is passed through exactly as the caller wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentKind {
    Target,
    PortRange,
    Mac,
    Interface,
}

impl ArgumentKind {
    pub fn field(&self) -> FieldKind {
        match self {
            Self::Target => FieldKind::Target,
            Self::PortRange => FieldKind::PortRange,
            Self::Mac => FieldKind::Mac,
            Self::Interface => FieldKind::Interface,
        }
    }
}

/// One allow-listed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedCommandSpec {
    pub name: String,
    pub absolute_path: PathBuf,
    #[serde(default)]
    pub allowed_arguments: BTreeSet<String>,
    #[serde(default)]
    pub value_kinds: BTreeSet<ArgumentKind>,
}

impl AllowedCommandSpec {
    pub fn new<I, S>(name: impl Into<String>, absolute_path: impl Into<PathBuf>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            absolute_path: absolute_path.into(),
            allowed_arguments: allowed.into_iter().map(Into::into).collect(),
            value_kinds: BTreeSet::new(),
        }
    }

    pub fn with_values(mut self, kinds: impl IntoIterator<Item = ArgumentKind>) -> Self {
        self.value_kinds.extend(kinds);
        self
    }

    /// Whether `token` may accompany this command.
    pub fn permits(&self, token: &str) -> bool {
        self.allowed_arguments.contains(token)
            || self
                .value_kinds
                .iter()
                .any(|kind| kind.field().check(token).is_accepted())
    }

    fn check_shape(&self) -> Result<(), RegistryError> {
        let path = self.absolute_path.display().to_string();
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName(path));
        }
        if !self.absolute_path.is_absolute() {
            return Err(RegistryError::RelativePath {
                name: self.name.clone(),
                path,
            });
        }
        if self
            .absolute_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
        {
            return Err(RegistryError::ParentComponent {
                name: self.name.clone(),
                path,
            });
        }
        Ok(())
    }

    fn check_executable(&self) -> Result<(), RegistryError> {
        let path = &self.absolute_path;
        let not_found = || RegistryError::NotFound {
            name: self.name.clone(),
            path: path.display().to_string(),
        };
        let metadata = std::fs::metadata(path).map_err(|_| not_found())?;
        if !metadata.is_file() || !is_executable(&metadata) {
            return Err(RegistryError::NotExecutable {
                name: self.name.clone(),
                path: path.display().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

/// Read-only table of allow-listed commands.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, AllowedCommandSpec>,
}

impl CommandRegistry {
    /// Build a registry, failing on the first entry whose executable is
    /// missing, relative, or not executable.
    pub fn new(specs: impl IntoIterator<Item = AllowedCommandSpec>) -> Result<Self, RegistryError> {
        Self::build(specs, true)
    }

    /// Build a registry without touching the filesystem. Path shape is
    /// still checked.
    pub fn unchecked(specs: impl IntoIterator<Item = AllowedCommandSpec>) -> Result<Self, RegistryError> {
        Self::build(specs, false)
    }

    /// The built-in table, keeping only the tools installed on this host.
    ///
    /// Missing tools are logged and left out; anything else wrong with an
    /// entry is still an error.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut installed = Vec::new();
        for spec in default_commands() {
            spec.check_shape()?;
            match spec.check_executable() {
                Ok(()) => installed.push(spec),
                Err(RegistryError::NotFound { name, path }) => {
                    warn!("Skipping '{}': not installed at {}", name, path);
                }
                Err(e) => return Err(e),
            }
        }
        Self::build(installed, true)
    }

    fn build(
        specs: impl IntoIterator<Item = AllowedCommandSpec>,
        check_fs: bool,
    ) -> Result<Self, RegistryError> {
        let mut commands = BTreeMap::new();
        for spec in specs {
            spec.check_shape()?;
            if check_fs {
                spec.check_executable()?;
            }
            if commands.contains_key(&spec.name) {
                return Err(RegistryError::Duplicate(spec.name));
            }
            debug!(
                "Registered command '{}' -> {} ({} tokens)",
                spec.name,
                spec.absolute_path.display(),
                spec.allowed_arguments.len()
            );
            commands.insert(spec.name.clone(), spec);
        }
        Ok(Self { commands })
    }

    pub fn get(&self, name: &str) -> Option<&AllowedCommandSpec> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &AllowedCommandSpec> {
        self.commands.values()
    }

    /// Check a request against the table and build its argv.
    ///
    /// The result is `[absolute_path] + args`, in the caller's order, with
    /// duplicates kept. The first token that is not permitted rejects the
    /// whole request.
    pub fn authorize(&self, name: &str, args: &[String]) -> Result<Vec<String>, RejectReason> {
        let spec = self.get(name).ok_or_else(|| RejectReason::UnknownCommand {
            command: name.to_string(),
        })?;

        if let Some(bad) = args.iter().find(|arg| !spec.permits(arg)) {
            return Err(RejectReason::ArgumentNotPermitted {
                command: name.to_string(),
                argument: bad.clone(),
            });
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(spec.absolute_path.to_string_lossy().into_owned());
        argv.extend(args.iter().cloned());
        Ok(argv)
    }
}

/// The stock tool table for the device.
pub fn default_commands() -> Vec<AllowedCommandSpec> {
    vec![
        AllowedCommandSpec::new(
            "nmap",
            "/usr/bin/nmap",
            ["-F", "-T4", "-sn", "-Pn", "-p", "--host-timeout", "60", "-oG", "-"],
        )
        .with_values([ArgumentKind::Target, ArgumentKind::PortRange]),
        AllowedCommandSpec::new(
            "airmon-ng",
            "/usr/sbin/airmon-ng",
            ["start", "stop", "status", "check", "kill"],
        )
        .with_values([ArgumentKind::Interface]),
        AllowedCommandSpec::new(
            "aireplay-ng",
            "/usr/sbin/aireplay-ng",
            ["--deauth", "--count", "-a", "-c", "-w"],
        )
        .with_values([ArgumentKind::Mac, ArgumentKind::Interface]),
        AllowedCommandSpec::new("reaver", "/usr/sbin/reaver", ["-i", "-b", "-vv", "-K", "-N", "-t"])
            .with_values([ArgumentKind::Mac, ArgumentKind::Interface]),
        AllowedCommandSpec::new("iwconfig", "/sbin/iwconfig", ["wlan0", "wlan1", "monitor", "managed", "mode"]),
        AllowedCommandSpec::new(
            "nmcli",
            "/usr/bin/nmcli",
            ["-t", "-f", "dev", "wifi", "list", "connect"],
        ),
        AllowedCommandSpec::new(
            "bluetoothctl",
            "/usr/bin/bluetoothctl",
            ["scan", "on", "off", "devices", "power"],
        ),
        AllowedCommandSpec::new("arpspoof", "/usr/sbin/arpspoof", ["-i", "-t", "-r"])
            .with_values([ArgumentKind::Interface, ArgumentKind::Target]),
        AllowedCommandSpec::new("ip", "/usr/sbin/ip", ["link", "addr", "show", "set", "up", "down", "dev"])
            .with_values([ArgumentKind::Interface]),
        AllowedCommandSpec::new("shutdown", "/usr/sbin/shutdown", ["-h", "now"]),
        AllowedCommandSpec::new("reboot", "/usr/sbin/reboot", Vec::<String>::new()),
        // Elevation helper for privileged calls; takes no arguments of its own.
        AllowedCommandSpec::new("sudo", "/usr/bin/sudo", Vec::<String>::new()),
    ]
}

/// Convenience for `&[&str]` call sites.
pub fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn registry() -> CommandRegistry {
        CommandRegistry::unchecked(default_commands()).unwrap()
    }

    #[test]
    fn test_default_table_shape() {
        let registry = registry();
        assert_eq!(registry.len(), 12);
        assert!(registry.contains("nmap"));
        assert!(registry.get("sudo").unwrap().allowed_arguments.is_empty());
        assert!(registry.get("reboot").unwrap().allowed_arguments.is_empty());
        assert!(!registry.contains("rm"));
    }

    #[test]
    fn test_unknown_command_rejected() {
        let err = registry().authorize("rm", &to_args(&["-rf", "/"])).unwrap_err();
        assert_eq!(
            err,
            RejectReason::UnknownCommand {
                command: "rm".to_string()
            }
        );
    }

    #[test]
    fn test_argv_is_path_plus_args_in_order() {
        let args = to_args(&["-Pn", "-sn", "-Pn", "192.168.1.0/24"]);
        let argv = registry().authorize("nmap", &args).unwrap();
        assert_eq!(argv, to_args(&["/usr/bin/nmap", "-Pn", "-sn", "-Pn", "192.168.1.0/24"]));
    }

    #[test]
    fn test_exact_match_only() {
        let registry = registry();
        for bad in ["-F ", "-T", "-T5", "--host-timeout=60", "-oX", "-iL", "start;id"] {
            let err = registry.authorize("nmap", &to_args(&[bad])).unwrap_err();
            assert!(
                matches!(err, RejectReason::ArgumentNotPermitted { ref argument, .. } if argument == bad),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_value_slots() {
        let registry = registry();
        assert!(registry.authorize("nmap", &to_args(&["-p", "22,80,1000-2000", "10.0.0.1"])).is_ok());
        assert!(registry.authorize("nmap", &to_args(&["10.0.0.1; reboot"])).is_err());
        assert!(registry.authorize("reaver", &to_args(&["-i", "wlan0mon", "-b", "aa:bb:cc:dd:ee:ff"])).is_ok());
        // commands without slots take only their fixed tokens
        assert!(registry.authorize("iwconfig", &to_args(&["wlan2"])).is_err());
        assert!(registry.authorize("reboot", &to_args(&["now"])).is_err());
        assert!(registry.authorize("reboot", &[]).is_ok());
    }

    #[test]
    fn test_relative_and_parent_paths_rejected() {
        let err = CommandRegistry::unchecked([AllowedCommandSpec::new("nmap", "nmap", ["-F"])]).unwrap_err();
        assert!(matches!(err, RegistryError::RelativePath { .. }));

        let err = CommandRegistry::unchecked([AllowedCommandSpec::new("x", "/usr/bin/../bin/sh", ["-c"])])
            .unwrap_err();
        assert!(matches!(err, RegistryError::ParentComponent { .. }));

        let err = CommandRegistry::unchecked([AllowedCommandSpec::new(" ", "/bin/true", ["a"])]).unwrap_err();
        assert!(matches!(err, RegistryError::EmptyName(_)));
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = CommandRegistry::unchecked([
            AllowedCommandSpec::new("a", "/bin/a", ["x"]),
            AllowedCommandSpec::new("a", "/bin/b", ["y"]),
        ])
        .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(ref n) if n == "a"));
    }

    #[test]
    fn test_checked_build_fails_fast() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = CommandRegistry::new([AllowedCommandSpec::new("nope", &missing, ["x"])]).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));

        let plain = dir.path().join("plain");
        std::fs::write(&plain, "data").unwrap();
        let err = CommandRegistry::new([AllowedCommandSpec::new("plain", &plain, ["x"])]).unwrap_err();
        assert!(matches!(err, RegistryError::NotExecutable { .. }));

        let err = CommandRegistry::new([AllowedCommandSpec::new("dir", dir.path(), ["x"])]).unwrap_err();
        assert!(matches!(err, RegistryError::NotExecutable { .. }));
    }

    #[test]
    fn test_checked_build_accepts_real_binary() {
        let registry = CommandRegistry::new([AllowedCommandSpec::new("true", "/bin/sh", ["-c"])]).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.authorize("true", &to_args(&["-c"])).unwrap()[0], "/bin/sh");
    }

    #[test]
    fn test_builtin_skips_missing_tools() {
        let registry = CommandRegistry::builtin().unwrap();
        for spec in registry.iter() {
            assert!(spec.absolute_path.exists());
        }
    }

    #[test]
    fn test_spec_deserializes_from_toml() {
        let spec: AllowedCommandSpec = toml::from_str(
            r#"
            name = "nmap"
            absolute_path = "/usr/bin/nmap"
            allowed_arguments = ["-sn", "-F"]
            value_kinds = ["target"]
            "#,
        )
        .unwrap();
        assert!(spec.permits("-sn"));
        assert!(spec.permits("10.0.0.0/8"));
        assert!(!spec.permits("-p"));
    }
}
