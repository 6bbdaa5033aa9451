//! Per-destination push credentials.

use std::collections::HashMap;

use secrecy::SecretString;
use url::Url;

use crate::config::{Config, SyncUser};
use crate::secrets::{SecretError, SecretSource};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No SyncUser configured for host '{0}'")]
    UnknownHost(String),

    #[error("Failed to resolve password for host '{host}': {source}")]
    Secret {
        host: String,
        #[source]
        source: SecretError,
    },
}

/// Username/password pair used for HTTP basic auth against a mirror target.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Network-location segment of a URL (`host` or `host:port`), used to pick
/// credentials and to name the push remote.
///
/// Returns `None` for URLs without a host, such as `file:///srv/git/repo.git`.
pub fn host_identifier(url: &Url) -> Option<String> {
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Maps destination hosts to push credentials from the static configuration.
///
/// Nothing is cached: the password source is consulted on every call.
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    users: HashMap<String, SyncUser>,
}

impl CredentialResolver {
    pub fn new(users: HashMap<String, SyncUser>) -> Self {
        Self { users }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sync_user.clone())
    }

    pub fn is_configured(&self, host: &str) -> bool {
        self.users.contains_key(host)
    }

    /// Resolves credentials for a host identifier.
    ///
    /// An unconfigured host is an error rather than an anonymous pair, so a
    /// misconfigured mirror fails with a clear diagnosis.
    pub fn resolve(&self, host: &str) -> Result<Credentials, CredentialError> {
        let user = self
            .users
            .get(host)
            .ok_or_else(|| CredentialError::UnknownHost(host.to_string()))?;

        let source = SecretSource {
            direct: user.password.as_deref(),
            file_path: user.password_file.as_deref(),
            env_var: user.password_env_var.as_deref(),
        };

        let password = source.resolve().map_err(|e| CredentialError::Secret {
            host: host.to_string(),
            source: e,
        })?;

        Ok(Credentials {
            username: user.username.clone(),
            password,
        })
    }
}
