//! Error types for rollout operations.
//!
//! This module defines [`RolloutError`], the primary error type used throughout
//! the orchestrator, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Graph and state errors (`CircularDependency`, `UnknownDependency`,
//!   `StateFingerprintMismatch`) are fatal and surface before any step runs
//! - `StepExecutionError` is absorbed into per-step state by the scheduler
//! - `RollbackError` is logged and never escalates
//! - Use `anyhow::Error` (via `RolloutError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::AggregateSyncError;

/// Core error type for rollout operations.
#[derive(Debug, Error)]
pub enum RolloutError {
    /// Configuration file not found at expected location.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse configuration file.
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// Invalid configuration structure or values.
    #[error("Invalid configuration: {message}")]
    ConfigValidationError { message: String },

    /// Two steps were registered under the same name.
    #[error("Step '{name}' is registered more than once")]
    DuplicateStep { name: String },

    /// A step depends on a name that is not part of the step set.
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    /// Step dependency cycle detected.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// Persisted state for a completed step was produced under a different configuration.
    #[error(
        "State for step '{step}' was recorded with a different configuration \
         (recorded {recorded}, current {current}); clear the state or rerun without --resume"
    )]
    StateFingerprintMismatch {
        step: String,
        recorded: String,
        current: String,
    },

    /// The state file belongs to another workspace.
    #[error("State file belongs to run '{found}', expected '{expected}'")]
    StateRunMismatch { expected: String, found: String },

    /// The state file exists but cannot be decoded.
    #[error("Failed to read state at {path}: {message}")]
    StateParseError { path: PathBuf, message: String },

    /// Step execution failed.
    #[error("Step '{step}' failed: {message}")]
    StepExecutionError { step: String, message: String },

    /// A compensating action failed during rollback.
    #[error("Rollback of step '{step}' failed: {message}")]
    RollbackError { step: String, message: String },

    /// An artifact exists in none of the configured sources.
    #[error("Artifact '{artifact}' not found in {sources}")]
    ArtifactNotFound { artifact: String, sources: String },

    /// A registry request failed.
    #[error("Registry request to {url} failed: {message}")]
    Registry { url: String, message: String },

    /// One or more synchronizer tasks failed.
    #[error(transparent)]
    Sync(#[from] AggregateSyncError),

    /// Shell command failed.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// A command ran past its own timeout and was killed.
    #[error("Command timed out after {timeout_secs}s: {command}")]
    CommandTimedOut { command: String, timeout_secs: u64 },

    /// Work was abandoned because the run was cancelled.
    #[error("Cancelled: {reason}")]
    Cancelled { reason: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for rollout operations.
pub type Result<T> = std::result::Result<T, RolloutError>;
