//! Error taxonomy for the command execution core.
//!
//! Validation and whitelist failures are ordinary, recoverable values. Resource
//! and spawn failures are reported to the caller and never retried here. A
//! privilege error means the process is in an unverified state and callers
//! must stop doing anything privilege-sensitive.

use std::time::Duration;

/// Top-level error for callers that prefer `?` over matching on outcomes.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// Malformed or unsafe user input. The caller may re-prompt.
    #[error("input rejected ({field}): {reason}")]
    ValidationRejected { field: String, reason: String },

    /// Command or argument not on the allow-list. Never retried.
    #[error("not permitted: {0}")]
    WhitelistViolation(String),

    /// Timeout, cancellation, memory ceiling, or executor capacity.
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// The executable could not be started.
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// The privilege drop failed or could not be verified.
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),
}

/// Failure to reduce the process identity.
///
/// Treat as fatal: the process must not continue with an unverified
/// privilege level.
#[derive(Debug, thiserror::Error)]
pub enum PrivilegeError {
    #[error("failed to clear supplementary groups: {0}")]
    SetGroups(String),

    #[error("failed to set group id to {gid}: {reason}")]
    SetGid { gid: u32, reason: String },

    #[error("failed to set user id to {uid}: {reason}")]
    SetUid { uid: u32, reason: String },

    #[error(
        "privilege drop verification failed: expected uid={expected_uid} gid={expected_gid}, \
         found uid={actual_uid} gid={actual_gid}"
    )]
    VerificationFailed {
        expected_uid: u32,
        expected_gid: u32,
        actual_uid: u32,
        actual_gid: u32,
    },

    #[error("privileges already dropped to uid={uid} gid={gid}; refusing to change identity again")]
    AlreadyDropped { uid: u32, gid: u32 },
}

/// Errors raised while building the command registry at startup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("command '{0}' has an empty name")]
    EmptyName(String),

    #[error("command '{name}': path '{path}' is not absolute")]
    RelativePath { name: String, path: String },

    #[error("command '{name}': path '{path}' contains a parent directory component")]
    ParentComponent { name: String, path: String },

    #[error("command '{name}': executable not found at '{path}'")]
    NotFound { name: String, path: String },

    #[error("command '{name}': '{path}' is not an executable file")]
    NotExecutable { name: String, path: String },

    #[error("command '{0}' is registered twice")]
    Duplicate(String),
}

/// Errors from the credential cache.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential ttl must be greater than zero")]
    ZeroTtl,

    #[error("credential ttl {0:?} exceeds the configured maximum {1:?}")]
    TtlTooLong(Duration, Duration),

    #[error("credential secret is empty")]
    EmptySecret,
}

pub type Result<T, E = SecurityError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_message() {
        let err = SecurityError::ValidationRejected {
            field: "mac".to_string(),
            reason: "expected six hex byte groups".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "input rejected (mac): expected six hex byte groups"
        );
    }

    #[test]
    fn test_privilege_error_converts() {
        let err: SecurityError = PrivilegeError::SetUid {
            uid: 1000,
            reason: "EPERM".to_string(),
        }
        .into();
        assert!(matches!(err, SecurityError::Privilege(_)));
        assert!(err.to_string().contains("user id to 1000"));
    }

    #[test]
    fn test_verification_message_names_both_identities() {
        let err = PrivilegeError::VerificationFailed {
            expected_uid: 1000,
            expected_gid: 1000,
            actual_uid: 0,
            actual_gid: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected uid=1000"));
        assert!(msg.contains("found uid=0"));
    }
}
