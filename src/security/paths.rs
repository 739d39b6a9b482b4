//! Category-rooted file locations.
//!
//! The directory a file lives in is always chosen by the caller from
//! [`PathCategory`]; only the final name comes from untrusted input, and that
//! goes through [`validate_filename`] first.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::validator::{validate_filename, FieldKind};
use crate::error::SecurityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathCategory {
    Logs,
    Cache,
    Exports,
    Captures,
    Config,
}

impl PathCategory {
    pub const ALL: [PathCategory; 5] = [
        PathCategory::Logs,
        PathCategory::Cache,
        PathCategory::Exports,
        PathCategory::Captures,
        PathCategory::Config,
    ];

    /// Directory name under the base directory.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::Cache => "cache",
            Self::Exports => "exports",
            Self::Captures => "captures",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for PathCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for PathCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.dir_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown path category: {}", s))
    }
}

/// Resolves untrusted filenames under a fixed base directory.
#[derive(Debug, Clone)]
pub struct SafePaths {
    base: PathBuf,
}

impl SafePaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn dir(&self, category: PathCategory) -> PathBuf {
        self.base.join(category.dir_name())
    }

    /// `base/<category>/<basename(raw)>`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationRejected` if `raw` has no usable final component.
    pub fn resolve(&self, category: PathCategory, raw: &str) -> Result<PathBuf, SecurityError> {
        let name = validate_filename(raw).into_result(FieldKind::Filename)?;
        Ok(self.dir(category).join(name))
    }

    /// Create every category directory (mode 0750 on unix).
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for category in PathCategory::ALL {
            let dir = self.dir(category);
            std::fs::create_dir_all(&dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o750))?;
            }
        }
        Ok(())
    }
}
