use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Process configuration, loaded once at startup.
///
/// Keys are PascalCase so existing `config.json` files keep working.
/// Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Shared secret for `/update_whitelist`. Empty disables reloads.
    #[serde(default)]
    pub update_whitelist_token: String,
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
    /// Push credentials keyed by destination host (`host` or `host:port`).
    #[serde(default)]
    pub sync_user: HashMap<String, SyncUser>,
    #[serde(default = "default_repos_root")]
    pub repos_root: PathBuf,
    #[serde(default = "default_whitelist_path")]
    pub whitelist_path: PathBuf,
    /// Appended to the triggering repository URL to locate the raw whitelist.
    #[serde(default = "default_whitelist_raw_path")]
    pub whitelist_raw_path: String,
    /// When set, only this repository may trigger a whitelist reload;
    /// otherwise any whitelisted repository may.
    #[serde(default)]
    pub whitelist_repo: Option<String>,
    #[serde(default = "default_onboarding_url")]
    pub onboarding_url: String,
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_sync_workers")]
    pub sync_workers: usize,
    #[serde(default)]
    pub sync_queue_capacity: Option<usize>,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_repos_root() -> PathBuf {
    PathBuf::from("./repos")
}

fn default_whitelist_path() -> PathBuf {
    PathBuf::from("./config/syncWhitelist")
}

fn default_whitelist_raw_path() -> String {
    "raw/master/config/syncWhitelist".to_string()
}

fn default_onboarding_url() -> String {
    "https://gitee.com/kesin/GiteeAutoUpdate".to_string()
}

fn default_git_timeout_secs() -> u64 {
    600
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_sync_workers() -> usize {
    num_cpus::get()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            update_whitelist_token: String::new(),
            ip_whitelist: Vec::new(),
            sync_user: HashMap::new(),
            repos_root: default_repos_root(),
            whitelist_path: default_whitelist_path(),
            whitelist_raw_path: default_whitelist_raw_path(),
            whitelist_repo: None,
            onboarding_url: default_onboarding_url(),
            git_timeout_secs: default_git_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            sync_workers: default_sync_workers(),
            sync_queue_capacity: None,
        }
    }
}

impl Config {
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Pending-job capacity of the sync queue; twice the worker count unless set.
    pub fn queue_capacity(&self) -> usize {
        self.sync_queue_capacity
            .unwrap_or(self.sync_workers.saturating_mul(2))
            .max(1)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| ConfigError::Validation {
                message: format!("Invalid BindAddress '{}': {}", self.bind_address, e),
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Parses the origin allow-list.
    pub fn allowed_origins(&self) -> Result<Vec<IpAddr>, ConfigError> {
        self.ip_whitelist
            .iter()
            .map(|raw| {
                raw.trim()
                    .parse::<IpAddr>()
                    .map_err(|e| ConfigError::Validation {
                        message: format!("Invalid IpWhitelist entry '{}': {}", raw, e),
                    })
            })
            .collect()
    }
}

/// Credentials used to push to one destination host.
///
/// The password is resolved on every push, in priority order: `Password`,
/// `PasswordFile`, `PasswordEnvVar`.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncUser {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<String>,
    #[serde(default)]
    pub password_env_var: Option<String>,
}

impl std::fmt::Debug for SyncUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncUser")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("password_file", &self.password_file)
            .field("password_env_var", &self.password_env_var)
            .finish()
    }
}
