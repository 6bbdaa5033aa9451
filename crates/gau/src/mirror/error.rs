//! Mirror-specific error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::credentials::CredentialError;

/// Errors that can occur while refreshing or pushing a mirror.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git network error: {0}")]
    GitNetworkError(String),

    #[error("Git operation timed out after {0}s")]
    GitTimeout(u64),

    #[error("Git authentication failed: {0}")]
    GitAuthFailed(String),

    #[error("Push rejected by remote: {0}")]
    PushRejected(String),

    #[error("Invalid repository url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),

    #[error("Failed to prepare mirror directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

impl MirrorError {
    /// Returns true if the error is likely transient and the next trigger may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MirrorError::GitNetworkError(_) | MirrorError::GitTimeout(_)
        )
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> MirrorError {
    let lower = stderr.to_lowercase();
    let message = stderr.trim().to_string();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return MirrorError::GitNetworkError(message);
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("could not read username")
        || lower.contains("could not read password")
    {
        return MirrorError::GitAuthFailed(message);
    }

    if lower.contains("[remote rejected]")
        || lower.contains("protected branch")
        || lower.contains("pre-receive hook declined")
    {
        return MirrorError::PushRejected(message);
    }

    MirrorError::GitOperation(message)
}

pub type Result<T> = std::result::Result<T, MirrorError>;
