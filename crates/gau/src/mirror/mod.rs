//! Mirror synchronization engine.
//!
//! Keeps one bare mirror per source repository under the repos root, refreshes
//! it from the source, then force-pushes branches and tags to each target.

pub mod auth;
pub mod error;
pub mod git;
pub mod parse;
pub mod path;
pub mod synchronizer;

pub use error::{MirrorError, Result};
pub use git::{BareMirror, FetchResult};
pub use synchronizer::{
    MirrorRefresh, MirrorSynchronizer, SyncError, SyncOutcome, SyncReport, SyncStage,
};
