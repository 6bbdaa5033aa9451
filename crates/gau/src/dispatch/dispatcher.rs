//! Webhook handling: decides whether an event syncs or reloads, then hands
//! the slow work off so callers never wait on git.

use std::sync::Arc;

use tokio::sync::broadcast;
use url::Url;

use super::pool::{SyncJob, SyncPool};
use crate::auth::{AuthError, AuthorizationGate};
use crate::config::Config;
use crate::error::WorkerError;
use crate::mirror::SyncReport;
use crate::webhook::{WebhookError, WebhookEvent};
use crate::whitelist::{WhitelistError, WhitelistRegistry, WhitelistSource};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Parse(#[from] WebhookError),

    #[error(
        "This repo is not in whitelist, please create a PullRequest at {onboarding_url} to add your repo"
    )]
    NotWhitelisted { url: String, onboarding_url: String },

    #[error("Server busy, try again later: {0}")]
    Busy(#[from] WorkerError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Cannot derive whitelist url from '{url}': {reason}")]
    InvalidReloadUrl { url: String, reason: String },

    #[error("Failed to update whitelist: {0}")]
    Reload(#[from] WhitelistError),
}

/// A sync request that was accepted. `job_id` is `None` when the source has
/// no targets and nothing was queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAccepted {
    pub source: String,
    pub targets: usize,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub onboarding_url: String,
    pub whitelist_raw_path: String,
    pub whitelist_repo: Option<String>,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            onboarding_url: config.onboarding_url.clone(),
            whitelist_raw_path: config.whitelist_raw_path.clone(),
            whitelist_repo: config.whitelist_repo.clone(),
        }
    }
}

pub struct SyncDispatcher {
    registry: Arc<WhitelistRegistry>,
    pool: SyncPool,
    gate: Arc<AuthorizationGate>,
    settings: DispatchSettings,
}

impl SyncDispatcher {
    pub fn new(
        registry: Arc<WhitelistRegistry>,
        pool: SyncPool,
        gate: Arc<AuthorizationGate>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            pool,
            gate,
            settings,
        }
    }

    pub fn registry(&self) -> &WhitelistRegistry {
        &self.registry
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<Arc<SyncReport>> {
        self.pool.subscribe()
    }

    /// Accepts a sync for a whitelisted source and queues it; returns before
    /// any git work starts.
    pub fn handle_sync_event(&self, body: &[u8]) -> Result<SyncAccepted, DispatchError> {
        let event = WebhookEvent::from_slice(body)?;
        let source = event.repository_url();

        let targets = self
            .registry
            .lookup(source)
            .ok_or_else(|| DispatchError::NotWhitelisted {
                url: source.to_string(),
                onboarding_url: self.settings.onboarding_url.clone(),
            })?;

        if targets.is_empty() {
            log::info!("{} is whitelisted without targets, nothing to do", source);
            return Ok(SyncAccepted {
                source: source.to_string(),
                targets: 0,
                job_id: None,
            });
        }

        let job = SyncJob::new(source, targets);
        let accepted = SyncAccepted {
            source: job.source.clone(),
            targets: job.targets.len(),
            job_id: Some(job.id.clone()),
        };
        self.pool.submit(job)?;

        log::info!(
            "Queued sync {} of {} to {} target(s)",
            accepted.job_id.as_deref().unwrap_or_default(),
            accepted.source,
            accepted.targets
        );
        Ok(accepted)
    }

    /// Rebuilds the whitelist from the raw file in the triggering repository.
    /// Returns the number of whitelisted sources now in effect.
    pub async fn handle_reload_event(
        &self,
        body: &[u8],
        token: Option<&str>,
    ) -> Result<usize, DispatchError> {
        self.gate.check_token(token)?;

        let event = WebhookEvent::from_slice(body)?;
        let repo = event.repository_url();
        self.check_reload_repo(repo)?;

        let url = raw_whitelist_url(repo, &self.settings.whitelist_raw_path)?;
        let count = self
            .registry
            .reload(WhitelistSource::RemoteUrl(url))
            .await?;
        Ok(count)
    }

    /// With `WhitelistRepo` configured only that repository may reload;
    /// otherwise any whitelisted repository may.
    fn check_reload_repo(&self, repo: &str) -> Result<(), AuthError> {
        let permitted = match &self.settings.whitelist_repo {
            Some(allowed) => allowed.trim() == repo,
            None => self.registry.snapshot().contains(repo),
        };
        if permitted {
            Ok(())
        } else {
            Err(AuthError::RepoNotPermitted(repo.to_string()))
        }
    }

    /// Stops taking syncs and waits for queued ones to finish.
    pub async fn shutdown(&self) {
        self.pool.wait().await;
    }
}

/// Joins the repository URL and the raw-file path:
/// `https://gitee.com/kesin/GiteeAutoUpdate` becomes
/// `https://gitee.com/kesin/GiteeAutoUpdate/raw/master/config/syncWhitelist`.
pub fn raw_whitelist_url(repo_url: &str, raw_path: &str) -> Result<Url, DispatchError> {
    let invalid = |reason: String| DispatchError::InvalidReloadUrl {
        url: repo_url.to_string(),
        reason,
    };

    let base = repo_url.trim().trim_end_matches('/');
    let base = base.strip_suffix(".git").unwrap_or(base);
    let url = Url::parse(&format!("{}/{}", base, raw_path.trim_start_matches('/')))
        .map_err(|e| invalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}
