//! One-way privilege drop.
//!
//! Called once at startup after any privileged setup. Order is fixed:
//! supplementary groups, then gid, then uid. The uid goes last because once
//! it changes the process can no longer change its groups.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::error::PrivilegeError;

/// The identity syscalls, behind a seam so the ordering can be tested
/// without root.
pub trait IdentityOps: Send + Sync {
    /// Current effective `(uid, gid)`.
    fn effective_ids(&self) -> (u32, u32);
    /// Replace the supplementary group list with exactly `[gid]`.
    fn set_groups(&self, gid: u32) -> Result<(), String>;
    fn set_gid(&self, gid: u32) -> Result<(), String>;
    fn set_uid(&self, uid: u32) -> Result<(), String>;
}

/// Real identity operations via `nix`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentity;

impl IdentityOps for SystemIdentity {
    fn effective_ids(&self) -> (u32, u32) {
        (
            nix::unistd::geteuid().as_raw(),
            nix::unistd::getegid().as_raw(),
        )
    }

    fn set_groups(&self, gid: u32) -> Result<(), String> {
        nix::unistd::setgroups(&[nix::unistd::Gid::from_raw(gid)]).map_err(|e| e.to_string())
    }

    fn set_gid(&self, gid: u32) -> Result<(), String> {
        nix::unistd::setgid(nix::unistd::Gid::from_raw(gid)).map_err(|e| e.to_string())
    }

    fn set_uid(&self, uid: u32) -> Result<(), String> {
        nix::unistd::setuid(nix::unistd::Uid::from_raw(uid)).map_err(|e| e.to_string())
    }
}

/// What a successful [`PrivilegeDropper::drop_to`] actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// The identity was changed and verified.
    Dropped,
    /// Already running as the target; no syscalls were made.
    AlreadyTarget,
    /// Not running as root, so there was nothing to give up.
    NotPrivileged,
}

impl DropOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dropped => "dropped",
            Self::AlreadyTarget => "already_target",
            Self::NotPrivileged => "not_privileged",
        }
    }
}

pub struct PrivilegeDropper {
    ops: Arc<dyn IdentityOps>,
    audit: Arc<dyn AuditSink>,
    dropped_to: Mutex<Option<(u32, u32)>>,
}

impl PrivilegeDropper {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self::with_ops(Arc::new(SystemIdentity), audit)
    }

    pub fn with_ops(ops: Arc<dyn IdentityOps>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            ops,
            audit,
            dropped_to: Mutex::new(None),
        }
    }

    /// Target identity of an earlier successful drop, if any.
    pub fn dropped_to(&self) -> Option<(u32, u32)> {
        *self.dropped_to.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Drop the process to `uid:gid` and verify the result.
    ///
    /// Records exactly one PRIVILEGE audit event. An error here means the
    /// process identity is unverified; callers must not carry on with
    /// anything that relies on the drop.
    pub fn drop_to(&self, uid: u32, gid: u32) -> Result<DropOutcome, PrivilegeError> {
        let mut latch = self.dropped_to.lock().unwrap_or_else(|p| p.into_inner());
        let (from_uid, from_gid) = self.ops.effective_ids();

        let result = self.transition(*latch, (from_uid, from_gid), uid, gid);

        let mut event = AuditEvent::privilege("drop_privileges", AuditOutcome::from(result.is_ok()))
            .with_detail("from_uid", from_uid)
            .with_detail("from_gid", from_gid)
            .with_detail("to_uid", uid)
            .with_detail("to_gid", gid);
        match &result {
            Ok(outcome) => {
                if *outcome == DropOutcome::Dropped {
                    *latch = Some((uid, gid));
                    info!("Dropped privileges from uid={} to uid={} gid={}", from_uid, uid, gid);
                } else {
                    info!("Privilege drop skipped ({})", outcome.as_str());
                }
                event = event.with_detail("result", outcome.as_str());
            }
            Err(e) => {
                warn!("Privilege drop failed: {}", e);
                event = event.with_detail("reason", e);
            }
        }
        self.audit.record(event);

        result
    }

    fn transition(
        &self,
        latch: Option<(u32, u32)>,
        current: (u32, u32),
        uid: u32,
        gid: u32,
    ) -> Result<DropOutcome, PrivilegeError> {
        if let Some((dropped_uid, dropped_gid)) = latch {
            if (dropped_uid, dropped_gid) != (uid, gid) {
                return Err(PrivilegeError::AlreadyDropped {
                    uid: dropped_uid,
                    gid: dropped_gid,
                });
            }
        }

        if current == (uid, gid) {
            return Ok(DropOutcome::AlreadyTarget);
        }
        if current.0 != 0 {
            return Ok(DropOutcome::NotPrivileged);
        }

        self.ops.set_groups(gid).map_err(PrivilegeError::SetGroups)?;
        self.ops
            .set_gid(gid)
            .map_err(|reason| PrivilegeError::SetGid { gid, reason })?;
        self.ops
            .set_uid(uid)
            .map_err(|reason| PrivilegeError::SetUid { uid, reason })?;

        let (actual_uid, actual_gid) = self.ops.effective_ids();
        if (actual_uid, actual_gid) != (uid, gid) {
            return Err(PrivilegeError::VerificationFailed {
                expected_uid: uid,
                expected_gid: gid,
                actual_uid,
                actual_gid,
            });
        }

        Ok(DropOutcome::Dropped)
    }
}

impl std::fmt::Debug for PrivilegeDropper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegeDropper")
            .field("dropped_to", &self.dropped_to())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditCategory, MemoryAuditSink};

    /// Simulated process identity that records syscall order.
    struct FakeIdentity {
        ids: Mutex<(u32, u32)>,
        calls: Mutex<Vec<String>>,
        fail: Option<&'static str>,
        ignore_setuid: bool,
    }

    impl FakeIdentity {
        fn root() -> Self {
            Self {
                ids: Mutex::new((0, 0)),
                calls: Mutex::new(Vec::new()),
                fail: None,
                ignore_setuid: false,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn call(&self, name: &'static str, arg: u32) -> Result<(), String> {
            self.calls.lock().unwrap().push(format!("{}({})", name, arg));
            if self.fail == Some(name) {
                return Err("EPERM: Operation not permitted".to_string());
            }
            Ok(())
        }
    }

    impl IdentityOps for FakeIdentity {
        fn effective_ids(&self) -> (u32, u32) {
            *self.ids.lock().unwrap()
        }

        fn set_groups(&self, gid: u32) -> Result<(), String> {
            self.call("setgroups", gid)
        }

        fn set_gid(&self, gid: u32) -> Result<(), String> {
            self.call("setgid", gid)?;
            self.ids.lock().unwrap().1 = gid;
            Ok(())
        }

        fn set_uid(&self, uid: u32) -> Result<(), String> {
            self.call("setuid", uid)?;
            if !self.ignore_setuid {
                self.ids.lock().unwrap().0 = uid;
            }
            Ok(())
        }
    }

    fn dropper(ops: Arc<FakeIdentity>) -> (PrivilegeDropper, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        (PrivilegeDropper::with_ops(ops, sink.clone()), sink)
    }

    #[test]
    fn test_drop_from_root_in_order() {
        let ops = Arc::new(FakeIdentity::root());
        let (dropper, sink) = dropper(ops.clone());

        assert_eq!(dropper.drop_to(1000, 1000).unwrap(), DropOutcome::Dropped);
        assert_eq!(ops.effective_ids(), (1000, 1000));
        assert_eq!(ops.calls(), vec!["setgroups(1000)", "setgid(1000)", "setuid(1000)"]);
        assert_eq!(dropper.dropped_to(), Some((1000, 1000)));
        assert_eq!(sink.count(AuditCategory::Privilege), 1);
        assert_eq!(sink.last().unwrap().detail("result"), Some("dropped"));
    }

    #[test]
    fn test_second_call_is_noop() {
        let ops = Arc::new(FakeIdentity::root());
        let (dropper, sink) = dropper(ops.clone());

        dropper.drop_to(1000, 1000).unwrap();
        assert_eq!(dropper.drop_to(1000, 1000).unwrap(), DropOutcome::AlreadyTarget);
        assert_eq!(ops.calls().len(), 3);
        assert_eq!(sink.count(AuditCategory::Privilege), 2);
    }

    #[test]
    fn test_different_target_after_drop_is_refused() {
        let ops = Arc::new(FakeIdentity::root());
        let (dropper, sink) = dropper(ops.clone());

        dropper.drop_to(1000, 1000).unwrap();
        let err = dropper.drop_to(0, 0).unwrap_err();
        assert!(matches!(err, PrivilegeError::AlreadyDropped { uid: 1000, gid: 1000 }));
        assert_eq!(ops.calls().len(), 3);
        assert_eq!(sink.last().unwrap().outcome, AuditOutcome::Failure);
    }

    #[test]
    fn test_unprivileged_process_is_left_alone() {
        let ops = Arc::new(FakeIdentity {
            ids: Mutex::new((1001, 1001)),
            ..FakeIdentity::root()
        });
        let (dropper, _) = dropper(ops.clone());

        assert_eq!(dropper.drop_to(1000, 1000).unwrap(), DropOutcome::NotPrivileged);
        assert!(ops.calls().is_empty());
        assert_eq!(dropper.dropped_to(), None);
    }

    #[test]
    fn test_setgid_failure_stops_before_setuid() {
        let ops = Arc::new(FakeIdentity {
            fail: Some("setgid"),
            ..FakeIdentity::root()
        });
        let (dropper, sink) = dropper(ops.clone());

        let err = dropper.drop_to(1000, 1000).unwrap_err();
        assert!(matches!(err, PrivilegeError::SetGid { gid: 1000, .. }));
        assert_eq!(ops.calls(), vec!["setgroups(1000)", "setgid(1000)"]);
        assert_eq!(dropper.dropped_to(), None);
        let event = sink.last().unwrap();
        assert_eq!(event.outcome, AuditOutcome::Failure);
        assert!(event.detail("reason").unwrap().contains("EPERM"));
    }

    #[test]
    fn test_verification_catches_silent_failure() {
        let ops = Arc::new(FakeIdentity {
            ignore_setuid: true,
            ..FakeIdentity::root()
        });
        let (dropper, _) = dropper(ops);

        let err = dropper.drop_to(1000, 1000).unwrap_err();
        assert!(matches!(
            err,
            PrivilegeError::VerificationFailed { actual_uid: 0, actual_gid: 1000, .. }
        ));
    }

    #[test]
    fn test_system_identity_noop_for_current_ids() {
        let sink = Arc::new(MemoryAuditSink::new());
        let dropper = PrivilegeDropper::new(sink.clone());
        let (uid, gid) = SystemIdentity.effective_ids();

        assert_eq!(dropper.drop_to(uid, gid).unwrap(), DropOutcome::AlreadyTarget);
        assert_eq!(sink.len(), 1);
    }
}
