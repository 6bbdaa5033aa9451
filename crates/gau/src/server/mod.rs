//! HTTP surface: webhook endpoints behind the origin gate.

pub mod handler;
pub mod router;

use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use log::{info, warn};
use tokio::net::TcpListener;

use crate::auth::AuthorizationGate;
use crate::config::Config;
use crate::dispatch::{DispatchSettings, SyncDispatcher, SyncPool};
use crate::error::{GauError, Result};
use crate::mirror::MirrorSynchronizer;
use crate::whitelist::{WhitelistError, WhitelistRegistry, WhitelistSource};

pub use handler::{text_response, SYNC_ACCEPTED, TOKEN_HEADER};
pub use router::{build_router, AppState};

/// The relay service: router, dispatcher and sync workers wired from one
/// configuration.
pub struct GauServer {
    config: Config,
    state: AppState,
}

impl GauServer {
    /// Builds every component and loads the persisted whitelist.
    ///
    /// Must run inside a tokio runtime since it starts the sync workers.
    pub async fn from_config(config: Config) -> Result<Self> {
        let gate = Arc::new(AuthorizationGate::from_config(&config)?);
        if !gate.reload_enabled() {
            warn!("UpdateWhitelistToken is empty, whitelist reloads are disabled");
        }

        let registry = Arc::new(WhitelistRegistry::new(
            &config.whitelist_path,
            config.http_timeout(),
        )?);
        load_initial_whitelist(&registry).await?;

        let synchronizer = Arc::new(MirrorSynchronizer::from_config(&config));
        let pool = SyncPool::new(synchronizer, config.sync_workers, config.queue_capacity());
        let dispatcher = Arc::new(SyncDispatcher::new(
            registry,
            pool,
            Arc::clone(&gate),
            DispatchSettings::from_config(&config),
        ));

        Ok(Self {
            config,
            state: AppState { gate, dispatcher },
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<SyncDispatcher> {
        &self.state.dispatcher
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Binds the configured address and serves until Ctrl-C or SIGTERM.
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GauError::Bind {
                addr: addr.to_string(),
                source: e,
            })?;
        info!("gau listening on {}", addr);
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `signal` resolves, then drains queued syncs.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(GauError::Serve)?;

        info!("Server stopped accepting requests, waiting for queued syncs");
        self.state.dispatcher.shutdown().await;
        Ok(())
    }
}

/// A missing whitelist file means an empty whitelist; an unreadable or
/// malformed one stops startup.
async fn load_initial_whitelist(registry: &WhitelistRegistry) -> Result<()> {
    match registry.reload(WhitelistSource::LocalFile).await {
        Ok(count) => {
            info!(
                "Loaded {} whitelisted repositories from {}",
                count,
                registry.path().display()
            );
            Ok(())
        }
        Err(WhitelistError::ReadFile { ref source, .. }) if source.kind() == ErrorKind::NotFound => {
            warn!(
                "Whitelist file {} not found, starting with an empty whitelist",
                registry.path().display()
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
