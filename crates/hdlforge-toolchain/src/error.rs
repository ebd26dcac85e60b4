//! Errors that abort a pipeline run before any stage executes.

use hdlforge_core::{Role, SyncReport};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("synchronization failed for {} file(s)", .0.failures.len())]
    SyncFailed(SyncReport),

    #[error("a pipeline run is already in progress")]
    RunInProgress,

    #[error("no active {0} file")]
    NoActiveFile(Role),
}
