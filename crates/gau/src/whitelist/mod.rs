//! Source-repository whitelist: which repositories may sync, and where to.

pub mod error;
pub mod registry;
pub mod snapshot;

pub use error::WhitelistError;
pub use registry::{WhitelistRegistry, WhitelistSource};
pub use snapshot::{MirrorTarget, Whitelist};
