//! Inbound webhook payload.

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Failed to parse webhook payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Webhook payload has an empty repository url")]
    EmptyRepositoryUrl,
}

/// Push/merge webhook as sent by Gitee (and shaped compatibly by other forges).
///
/// Only the repository URL is required; everything else is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub hook_name: Option<String>,
    pub repository: WebhookRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRepository {
    pub url: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl WebhookEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        let event: WebhookEvent = serde_json::from_slice(body)?;
        if event.repository.url.trim().is_empty() {
            return Err(WebhookError::EmptyRepositoryUrl);
        }
        Ok(event)
    }

    pub fn repository_url(&self) -> &str {
        self.repository.url.trim()
    }
}
