//! Short-lived elevated-privilege credential.
//!
//! At most one secret is held, in memory only, and it stops being readable
//! once its TTL has elapsed. The expiry check and the clear happen under the
//! same lock, so no reader ever sees a stale secret.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::error::CredentialError;

/// Default credential lifetime (15 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(900);

/// Upper bound on any credential lifetime.
pub const MAX_TTL: Duration = Duration::from_secs(3600);

const AUDIT_SUBJECT: &str = "credential";

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        *offset += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|p| p.into_inner());
        self.origin + offset
    }
}

struct Credential {
    secret: Zeroizing<Vec<u8>>,
    acquired_at: Instant,
    ttl: Duration,
}

impl Credential {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.acquired_at) >= self.ttl
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.acquired_at))
    }
}

/// Process-wide holder for the elevated-privilege secret.
pub struct CredentialCache {
    slot: Mutex<Option<Credential>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    max_ttl: Duration,
    audit: Arc<dyn AuditSink>,
}

impl CredentialCache {
    /// Create an empty cache using the system clock.
    ///
    /// # Errors
    ///
    /// `default_ttl` must be non-zero and no longer than [`MAX_TTL`].
    pub fn new(default_ttl: Duration, audit: Arc<dyn AuditSink>) -> Result<Self, CredentialError> {
        Self::with_clock(default_ttl, audit, Arc::new(SystemClock))
    }

    pub fn with_clock(
        default_ttl: Duration,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CredentialError> {
        check_ttl(default_ttl, MAX_TTL)?;
        Ok(Self {
            slot: Mutex::new(None),
            clock,
            default_ttl,
            max_ttl: MAX_TTL,
            audit,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `secret` for `ttl`, replacing (and wiping) any previous one.
    pub fn set(&self, secret: impl Into<Vec<u8>>, ttl: Duration) -> Result<(), CredentialError> {
        let secret = Zeroizing::new(secret.into());
        let checked = if secret.is_empty() {
            Err(CredentialError::EmptySecret)
        } else {
            check_ttl(ttl, self.max_ttl)
        };

        if let Err(e) = checked {
            self.record("set", AuditOutcome::Failure, |ev| ev.with_detail("reason", &e));
            return Err(e);
        }

        let replaced = {
            let mut slot = self.lock();
            slot.replace(Credential {
                secret,
                acquired_at: self.clock.now(),
                ttl,
            })
            .is_some()
        };

        info!("Credential cached for {}s", ttl.as_secs());
        self.record("set", AuditOutcome::Success, |ev| {
            ev.with_detail("ttl_secs", ttl.as_secs())
                .with_detail("replaced", replaced)
        });
        Ok(())
    }

    /// Store `secret` for the configured default TTL.
    pub fn set_default(&self, secret: impl Into<Vec<u8>>) -> Result<(), CredentialError> {
        self.set(secret, self.default_ttl)
    }

    /// Copy of the secret if it has not expired. An expired secret is wiped.
    pub fn get(&self) -> Option<Zeroizing<Vec<u8>>> {
        self.with_secret(|s| Zeroizing::new(s.to_vec()))
    }

    /// Run `f` against the live secret without copying it out.
    pub fn with_secret<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let now = self.clock.now();
        let mut slot = self.lock();
        let expired = slot.as_ref()?.expired(now);
        if !expired {
            return slot.as_ref().map(|cred| f(&cred.secret));
        }

        slot.take();
        drop(slot);
        self.expired();
        None
    }

    pub fn is_valid(&self) -> bool {
        self.with_secret(|_| ()).is_some()
    }

    /// Time left before the secret expires, if one is held.
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.lock()
            .as_ref()
            .filter(|c| !c.expired(now))
            .map(|c| c.remaining(now))
    }

    /// Wipe the secret. Safe to call when empty.
    pub fn clear(&self) {
        let had_secret = self.lock().take().is_some();
        debug!("Credential cleared (held: {})", had_secret);
        self.record("clear", AuditOutcome::Success, |ev| ev.with_detail("had_secret", had_secret));
    }

    fn expired(&self) {
        info!("Cached credential expired");
        self.record("expire", AuditOutcome::Success, |ev| ev);
    }

    fn lock(&self) -> MutexGuard<'_, Option<Credential>> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, action: &str, outcome: AuditOutcome, f: impl FnOnce(AuditEvent) -> AuditEvent) {
        let event = AuditEvent::privilege(AUDIT_SUBJECT, outcome).with_detail("action", action);
        self.audit.record(f(event));
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("default_ttl", &self.default_ttl)
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

fn check_ttl(ttl: Duration, max: Duration) -> Result<(), CredentialError> {
    if ttl.is_zero() {
        Err(CredentialError::ZeroTtl)
    } else if ttl > max {
        Err(CredentialError::TtlTooLong(ttl, max))
    } else {
        Ok(())
    }
}
