//! Push authentication for git subprocesses.
//!
//! Credentials reach git through a throwaway `GIT_ASKPASS` script, never
//! through the remote URL or the command line, so they do not end up in the
//! mirror's config or in process listings.

use std::path::PathBuf;

use secrecy::ExposeSecret;

use super::error::{MirrorError, Result};
use crate::credentials::Credentials;

/// Escapes a value for safe use inside single-quoted shell strings.
/// Replaces single quotes with '\'' (end quote, escaped quote, start quote).
pub fn shell_escape(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// RAII guard for askpass script cleanup.
///
/// Deletes the script when dropped so secrets are not left on disk, even when
/// the git command fails.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Environment for one authenticated git invocation.
#[derive(Debug)]
pub struct AuthEnv {
    pub env_vars: Vec<(String, String)>,
    /// Must outlive the git command to keep the askpass script alive.
    pub _cleanup: AskpassCleanup,
}

impl AuthEnv {
    /// No credentials; used for local (`file://`) targets.
    pub fn anonymous() -> Self {
        Self {
            env_vars: Vec::new(),
            _cleanup: AskpassCleanup::empty(),
        }
    }
}

fn askpass_script(credentials: &Credentials) -> String {
    format!(
        r#"#!/bin/sh
case "$1" in
    Username*) echo '{}' ;;
    *) echo '{}' ;;
esac
"#,
        shell_escape(&credentials.username),
        shell_escape(credentials.password.expose_secret()),
    )
}

/// Builds an askpass environment answering git's username and password prompts.
#[cfg(unix)]
pub fn build_auth_env(credentials: &Credentials) -> Result<AuthEnv> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let path = std::env::temp_dir().join(format!(".gau-askpass-{}.sh", uuid::Uuid::new_v4()));
    let io_err = |e: std::io::Error| MirrorError::Io {
        path: path.clone(),
        source: e,
    };

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o700)
        .open(&path)
        .map_err(io_err)?;
    let cleanup = AskpassCleanup::new(path.clone());
    file.write_all(askpass_script(credentials).as_bytes())
        .map_err(io_err)?;
    drop(file);

    let path_str = path
        .to_str()
        .ok_or_else(|| {
            MirrorError::GitAuthFailed(
                "Temp directory path contains non-UTF8 characters".to_string(),
            )
        })?
        .to_string();

    Ok(AuthEnv {
        env_vars: vec![("GIT_ASKPASS".to_string(), path_str)],
        _cleanup: cleanup,
    })
}

#[cfg(not(unix))]
pub fn build_auth_env(_credentials: &Credentials) -> Result<AuthEnv> {
    Err(MirrorError::GitAuthFailed(
        "Password authentication is only supported on unix hosts".to_string(),
    ))
}
