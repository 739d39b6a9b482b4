//! Security Primitives
//!
//! Everything that decides whether untrusted input, a cached credential, or
//! the process identity may be used:
//!
//! - `validator.rs`: normalization and rejection of UI-supplied strings
//! - `paths.rs`: category-rooted file locations
//! - `credential.rs`: TTL-bounded in-memory secret
//! - `privilege.rs`: one-way uid/gid drop
//! - `context.rs`: the single owner that wires the above together

mod context;
mod credential;
mod paths;
mod privilege;
mod validator;

pub use context::SecurityContext;
pub use credential::{Clock, CredentialCache, ManualClock, SystemClock, DEFAULT_TTL, MAX_TTL};
pub use paths::{PathCategory, SafePaths};
pub use privilege::{DropOutcome, IdentityOps, PrivilegeDropper, SystemIdentity};
pub use validator::{
    is_printable, validate_filename, validate_interface, validate_mac, validate_name, validate_port_range,
    validate_target, FieldKind, ValidationOutcome, Validator, HIDDEN_NAME, MAX_NAME_LEN,
    NAME_METACHARACTERS,
};
