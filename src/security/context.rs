//! Process-wide owner of the security components.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::credential::CredentialCache;
use super::paths::SafePaths;
use super::privilege::{DropOutcome, PrivilegeDropper};
use super::validator::Validator;
use crate::audit::{AuditSink, FileAuditSink};
use crate::config::Config;
use crate::error::PrivilegeError;
use crate::tools::{
    CommandRegistry, ExecuteOptions, ExecutionOutcome, ExecutionRequest, ExecutorConfig, SafeExecutor,
};

/// Built once at startup and passed by reference to whatever needs it.
///
/// Every component shares the same audit sink, so one trail records
/// validation, command and privilege events in order.
#[derive(Clone)]
pub struct SecurityContext {
    audit: Arc<dyn AuditSink>,
    registry: Arc<CommandRegistry>,
    credentials: Arc<CredentialCache>,
    validator: Validator,
    executor: SafeExecutor,
    privileges: Arc<PrivilegeDropper>,
    paths: SafePaths,
    drop_target: (u32, u32),
}

impl SecurityContext {
    /// Wire every component from configuration.
    ///
    /// Creates the directory layout, opens the audit file and checks the
    /// command table. A configured table must resolve completely; the
    /// built-in one skips tools that are not installed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let paths = config.safe_paths();
        paths
            .ensure_dirs()
            .with_context(|| format!("Failed to create directories under {}", paths.base().display()))?;

        let audit_path = config.audit_path();
        let audit: Arc<dyn AuditSink> = Arc::new(
            FileAuditSink::open(&audit_path, config.audit.max_bytes, config.audit.backups)
                .with_context(|| format!("Failed to open audit log {}", audit_path.display()))?,
        );

        let registry = if config.commands.is_empty() {
            CommandRegistry::builtin().context("Failed to build built-in command table")?
        } else {
            CommandRegistry::new(config.command_specs()).context("Invalid [commands] configuration")?
        };
        if registry.is_empty() {
            warn!("Command registry is empty; every exec request will be rejected");
        }

        let credentials = CredentialCache::new(config.credential_ttl(), Arc::clone(&audit))
            .context("Invalid credential TTL")?;

        let context = Self::from_parts(
            audit,
            Arc::new(registry),
            Arc::new(credentials),
            config.executor_config(),
            paths,
            (config.privileges.uid, config.privileges.gid),
        );

        info!(
            "Security context ready: {} commands, audit={}, base={}",
            context.registry.len(),
            audit_path.display(),
            context.paths.base().display()
        );

        Ok(context)
    }

    /// Assemble a context from prebuilt parts (tests, embedding).
    pub fn from_parts(
        audit: Arc<dyn AuditSink>,
        registry: Arc<CommandRegistry>,
        credentials: Arc<CredentialCache>,
        executor_config: ExecutorConfig,
        paths: SafePaths,
        drop_target: (u32, u32),
    ) -> Self {
        Self {
            validator: Validator::new(Arc::clone(&audit)),
            executor: SafeExecutor::new(Arc::clone(&registry), Arc::clone(&audit), executor_config),
            privileges: Arc::new(PrivilegeDropper::new(Arc::clone(&audit))),
            audit,
            registry,
            credentials,
            paths,
            drop_target,
        }
    }

    /// Replace the privilege dropper, keeping everything else.
    pub fn with_privileges(mut self, privileges: PrivilegeDropper) -> Self {
        self.privileges = Arc::new(privileges);
        self
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn executor(&self) -> &SafeExecutor {
        &self.executor
    }

    pub fn privileges(&self) -> &PrivilegeDropper {
        &self.privileges
    }

    pub fn paths(&self) -> &SafePaths {
        &self.paths
    }

    /// Configured `(uid, gid)` for [`Self::drop_privileges`]
    pub fn drop_target(&self) -> (u32, u32) {
        self.drop_target
    }

    /// Run `request` through `sudo` with the cached credential.
    pub async fn execute_privileged(&self, request: &ExecutionRequest, options: ExecuteOptions) -> ExecutionOutcome {
        self.executor
            .execute_privileged(request, &self.credentials, options)
            .await
    }

    /// Drop to the configured target identity.
    pub fn drop_privileges(&self) -> Result<DropOutcome, PrivilegeError> {
        let (uid, gid) = self.drop_target;
        self.privileges.drop_to(uid, gid)
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("commands", &self.registry.len())
            .field("paths", &self.paths)
            .field("drop_target", &self.drop_target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditCategory, MemoryAuditSink};
    use crate::config::CommandEntry;
    use crate::security::{DropOutcome, FieldKind, IdentityOps, PathCategory};
    use crate::tools::{AllowedCommandSpec, RejectReason};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Starts as root and obeys every identity call.
    struct RootIdentity(Mutex<(u32, u32)>);

    impl IdentityOps for RootIdentity {
        fn effective_ids(&self) -> (u32, u32) {
            *self.0.lock().unwrap()
        }

        fn set_groups(&self, _gid: u32) -> Result<(), String> {
            Ok(())
        }

        fn set_gid(&self, gid: u32) -> Result<(), String> {
            self.0.lock().unwrap().1 = gid;
            Ok(())
        }

        fn set_uid(&self, uid: u32) -> Result<(), String> {
            self.0.lock().unwrap().0 = uid;
            Ok(())
        }
    }

    fn memory_context(sink: &Arc<MemoryAuditSink>) -> SecurityContext {
        let audit: Arc<dyn AuditSink> = sink.clone();
        let registry = Arc::new(
            CommandRegistry::unchecked([
                AllowedCommandSpec::new("echo", "/bin/echo", ["hi"]),
                AllowedCommandSpec::new("sudo", "/usr/bin/sudo", Vec::<String>::new()),
            ])
            .unwrap(),
        );
        let credentials = Arc::new(CredentialCache::new(Duration::from_secs(60), Arc::clone(&audit)).unwrap());
        SecurityContext::from_parts(
            audit,
            registry,
            credentials,
            ExecutorConfig::default(),
            SafePaths::new("/tmp/deckguard-test"),
            (1000, 1000),
        )
    }

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.paths.base_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_from_config_creates_layout_and_audit_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.commands.insert(
            "echo".to_string(),
            CommandEntry {
                path: PathBuf::from("/bin/echo"),
                allowed_arguments: ["hello".to_string()].into(),
                ..Default::default()
            },
        );

        let context = SecurityContext::from_config(&config).unwrap();
        for category in PathCategory::ALL {
            assert!(dir.path().join(category.dir_name()).is_dir());
        }
        assert_eq!(context.registry().len(), 1);
        assert!(context.registry().contains("echo"));

        context.validator().validate(FieldKind::Mac, "AA:BB:CC:DD:EE:FF");
        let audit = std::fs::read_to_string(config.audit_path()).unwrap();
        assert!(audit.contains("| VALIDATION |"));
    }

    #[test]
    fn test_from_config_rejects_missing_configured_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.commands.insert(
            "ghost".to_string(),
            CommandEntry {
                path: PathBuf::from("/nonexistent/deckguard-ghost"),
                ..Default::default()
            },
        );
        assert!(SecurityContext::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_components_share_one_audit_sink() {
        let sink = Arc::new(MemoryAuditSink::new());
        let context = memory_context(&sink);

        context.validator().target("10.0.0.1");
        context.credentials().set_default(b"secret".to_vec()).unwrap();
        let outcome = context
            .executor()
            .execute(&ExecutionRequest::new("rm", ["-rf", "/"]), ExecuteOptions::default())
            .await;
        assert!(matches!(outcome, ExecutionOutcome::Rejected { .. }));

        assert_eq!(sink.count(AuditCategory::Validation), 1);
        assert_eq!(sink.count(AuditCategory::Privilege), 1);
        assert_eq!(sink.count(AuditCategory::Command), 1);
    }

    #[tokio::test]
    async fn test_privileged_execution_needs_cached_credential() {
        let sink = Arc::new(MemoryAuditSink::new());
        let context = memory_context(&sink);

        let outcome = context
            .execute_privileged(&ExecutionRequest::new("echo", ["hi"]), ExecuteOptions::default())
            .await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Rejected {
                reason: RejectReason::CredentialUnavailable
            }
        );
        assert_eq!(sink.count(AuditCategory::Command), 1);
        assert_eq!(sink.last().unwrap().detail("privileged"), Some("true"));
    }

    #[test]
    fn test_drop_privileges_uses_configured_target() {
        let sink = Arc::new(MemoryAuditSink::new());
        let audit: Arc<dyn AuditSink> = sink.clone();
        let identity = Arc::new(RootIdentity(Mutex::new((0, 0))));
        let context = memory_context(&sink)
            .with_privileges(PrivilegeDropper::with_ops(identity.clone(), audit));

        assert_eq!(context.drop_privileges().unwrap(), DropOutcome::Dropped);
        assert_eq!(identity.effective_ids(), (1000, 1000));
        assert_eq!(context.privileges().dropped_to(), Some((1000, 1000)));
        assert_eq!(sink.count(AuditCategory::Privilege), 1);
    }
}
