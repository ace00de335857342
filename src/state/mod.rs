//! Resumable installation state.
//!
//! - [`StateStore`] - Atomic JSON persistence of step transitions
//! - [`RunId`] - Ties a state file to its workspace and workflow
//! - [`fingerprint`] - Detects configuration drift between runs

pub mod fingerprint;
pub mod run_id;
pub mod store;

pub use fingerprint::fingerprint;
pub use run_id::RunId;
pub use store::{InstallState, RunStatus, StateStore, StepState, StepStatus, DEFAULT_STATE_FILE};
