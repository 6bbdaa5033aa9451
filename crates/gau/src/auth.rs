//! Request authorization: origin allow-list and reload token.

use std::collections::HashSet;
use std::net::IpAddr;

use secrecy::{ExposeSecret, SecretString};

use crate::config::Config;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Request ip not in whitelist")]
    OriginNotAllowed(IpAddr),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Whitelist reload is disabled")]
    ReloadDisabled,

    #[error("Operation not permitted")]
    RepoNotPermitted(String),
}

/// Gate in front of every inbound request.
///
/// The origin check applies to all requests; the token check only to
/// whitelist reloads.
pub struct AuthorizationGate {
    allowed: HashSet<IpAddr>,
    reload_token: SecretString,
}

impl AuthorizationGate {
    pub fn new(allowed: impl IntoIterator<Item = IpAddr>, reload_token: impl Into<String>) -> Self {
        Self {
            allowed: allowed.into_iter().map(|ip| ip.to_canonical()).collect(),
            reload_token: SecretString::from(reload_token.into()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.allowed_origins()?,
            config.update_whitelist_token.clone(),
        ))
    }

    /// Accepts the caller iff its address is on the allow-list.
    ///
    /// IPv4-mapped IPv6 addresses are compared as plain IPv4.
    pub fn check_origin(&self, origin: IpAddr) -> Result<(), AuthError> {
        let origin = origin.to_canonical();
        if self.allowed.contains(&origin) {
            Ok(())
        } else {
            Err(AuthError::OriginNotAllowed(origin))
        }
    }

    /// Exact-match comparison against the configured reload secret.
    ///
    /// An empty configured secret disables reloads for every caller.
    pub fn check_token(&self, token: Option<&str>) -> Result<(), AuthError> {
        let expected = self.reload_token.expose_secret();
        if expected.is_empty() {
            return Err(AuthError::ReloadDisabled);
        }
        match token {
            Some(token) if token == expected => Ok(()),
            _ => Err(AuthError::Unauthorized),
        }
    }

    pub fn reload_enabled(&self) -> bool {
        !self.reload_token.expose_secret().is_empty()
    }
}
