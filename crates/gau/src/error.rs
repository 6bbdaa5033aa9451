use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GauError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Whitelist error: {0}")]
    Whitelist(#[from] crate::whitelist::WhitelistError),

    #[error("Failed to bind listener on '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file '{0}' is not a regular file, maybe the path is a directory?")]
    NotAFile(PathBuf),

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Sync queue is full ({capacity} jobs pending)")]
    QueueFull { capacity: usize },

    #[error("Sync worker pool is shut down")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, GauError>;
