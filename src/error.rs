// src/error.rs

//! Central error type for the helmsman crate.
//!
//! Error kinds map to how the controller recovers from them:
//! - not-found errors are returned to the caller and are never fatal
//! - patch rejections surface to the hook author; the loop continues
//! - enablement failures latch the pending config update for retry
//! - package-manager failures surface to the lifecycle caller
//! - cancellation is swallowed at the loop boundary on shutdown

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    #[error("global hook '{0}' not found")]
    GlobalHookNotFound(String),

    #[error("module hook '{0}' not found")]
    ModuleHookNotFound(String),

    /// A values patch that cannot be applied to the current snapshot.
    /// Rejected at intake; the store never retains a failing patch.
    #[error("invalid values patch: {0}")]
    PatchInvalid(String),

    /// An enablement probe errored. The reconciliation that ran it is
    /// aborted without committing anything.
    #[error("enablement probe for module '{module}' failed: {reason}")]
    Enablement { module: String, reason: String },

    #[error("package manager: {0}")]
    PackageManager(String),

    #[error("hook '{hook}' failed: {reason}")]
    HookFailed { hook: String, reason: String },

    #[error("catalog: {0}")]
    Catalog(String),

    #[error("config: {0}")]
    Config(String),

    /// Shutdown was requested while an operation was in flight.
    #[error("operation cancelled")]
    Cancelled,

    #[error("event loop is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
