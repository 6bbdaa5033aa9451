use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !metadata.is_file() {
        return Err(ConfigError::NotAFile(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.port == 0 {
        return Err(ConfigError::Validation {
            message: "Port must be greater than 0".to_string(),
        });
    }

    config.socket_addr()?;
    config.allowed_origins()?;

    for (host, user) in &config.sync_user {
        if host.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "SyncUser contains an empty host key".to_string(),
            });
        }
        if user.username.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("SyncUser '{}' has an empty Username", host),
            });
        }
    }

    if config.git_timeout_secs == 0 || config.http_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "GitTimeoutSecs and HttpTimeoutSecs must be greater than 0".to_string(),
        });
    }

    if config.sync_workers == 0 {
        return Err(ConfigError::Validation {
            message: "SyncWorkers must be greater than 0".to_string(),
        });
    }

    if config.whitelist_raw_path.trim_matches('/').is_empty() {
        return Err(ConfigError::Validation {
            message: "WhitelistRawPath must not be empty".to_string(),
        });
    }

    if config.repos_root.as_os_str().is_empty() || config.whitelist_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "ReposRoot and WhitelistPath must not be empty".to_string(),
        });
    }

    Ok(())
}
