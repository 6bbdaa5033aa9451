//! Secret resolution for push passwords.
//!
//! A password can be given in three ways, checked in this order:
//!
//! 1. **Direct value** (`"Password": "..."`), handy for local testing
//! 2. **File reference** (`"PasswordFile": "/run/secrets/mirror"`), Docker secrets style
//! 3. **Env var reference** (`"PasswordEnvVar": "MIRROR_PASSWORD"`)
//!
//! Files and variables are read on every call, so a rotated secret is picked
//! up by the next sync without a restart.

use secrecy::SecretString;
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where a secret may come from. Empty strings count as "not configured".
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretSource<'a> {
    pub direct: Option<&'a str>,
    pub file_path: Option<&'a str>,
    pub env_var: Option<&'a str>,
}

impl<'a> SecretSource<'a> {
    pub fn is_configured(&self) -> bool {
        non_empty(self.direct).is_some()
            || non_empty(self.file_path).is_some()
            || non_empty(self.env_var).is_some()
    }

    /// Resolves the secret from the first configured source.
    pub fn resolve(&self) -> Result<SecretString> {
        if let Some(value) = non_empty(self.direct) {
            return Ok(SecretString::from(value.to_string()));
        }

        if let Some(path) = non_empty(self.file_path) {
            let expanded = expand_home(path);
            return fs::read_to_string(&expanded)
                .map(|content| SecretString::from(content.trim().to_string()))
                .map_err(|e| SecretError::FileReadError {
                    path: expanded,
                    source: e,
                });
        }

        if let Some(name) = non_empty(self.env_var) {
            return match std::env::var(name) {
                // Trailing newlines are common when secrets are injected from files
                Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            };
        }

        Err(SecretError::NoSourceProvided)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Expands a leading `~` or `~/` to the current user's home directory.
///
/// `~user/path` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
