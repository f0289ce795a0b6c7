use std::io;

use thiserror::Error;

use crate::sandbox::BoxId;

pub type Result<T> = std::result::Result<T, RunnerErr>;

#[derive(Error, Debug)]
pub enum RunnerErr {
    /// Sandbox initialization failed. Fatal at startup; during release the
    /// box is quarantined instead.
    #[error("failed to init box {id}: {output}")]
    BoxInit { id: BoxId, output: String },

    /// Sandbox teardown failed. Logged by callers; never blocks re-init.
    #[error("failed to cleanup box {id}: {output}")]
    BoxCleanup { id: BoxId, output: String },

    /// No box became available before the admission deadline.
    #[error("timed out waiting for an available box")]
    AcquireTimedOut,

    /// The pool channel was closed. Only reachable during shutdown.
    #[error("box pool is closed")]
    PoolClosed,

    /// Returned when a child process could not be spawned or its stdio
    /// pipes could not be captured.
    #[error("spawn failed: {0}")]
    Spawn(String),

    // -----------------------------------------------------------------
    // Automatic conversions for common external error types
    // -----------------------------------------------------------------
    #[error(transparent)]
    Io(#[from] io::Error),
}
