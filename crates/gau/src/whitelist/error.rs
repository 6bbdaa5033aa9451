use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhitelistError {
    #[error("Whitelist file failed to open '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write whitelist file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse whitelist: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid mirror target '{target}' for '{source_url}': {reason}")]
    InvalidTarget {
        source_url: String,
        target: String,
        reason: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Failed to fetch whitelist from '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Fetching whitelist from '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },
}
