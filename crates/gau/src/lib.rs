pub mod auth;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod secrets;
pub mod server;
pub mod webhook;
pub mod whitelist;

#[cfg(test)]
mod test_support;

pub use auth::{AuthError, AuthorizationGate};
pub use config::{load_config, load_config_from_str, Config, SyncUser};
pub use credentials::{CredentialError, CredentialResolver, Credentials};
pub use dispatch::{DispatchError, SyncAccepted, SyncDispatcher, SyncJob, SyncPool};
pub use error::{ConfigError, GauError, Result, WorkerError};
pub use logging::init_logging;
pub use mirror::{MirrorError, MirrorSynchronizer, SyncReport};
pub use secrets::SecretError;
pub use server::{build_router, AppState, GauServer};
pub use webhook::{WebhookError, WebhookEvent};
pub use whitelist::{MirrorTarget, Whitelist, WhitelistError, WhitelistRegistry, WhitelistSource};
