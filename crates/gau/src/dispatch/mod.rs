pub mod dispatcher;
pub mod pool;

pub use dispatcher::{raw_whitelist_url, DispatchError, DispatchSettings, SyncAccepted, SyncDispatcher};
pub use pool::{SyncJob, SyncPool};
