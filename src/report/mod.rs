//! Run reporting.
//!
//! - [`Reporter`] renders [`RunEvent`](crate::runner::RunEvent)s and the final summary
//! - [`RunReport`] is the JSON document written by `--report-file`

pub mod json;
pub mod summary;

pub use json::{RollbackSummary, RunReport, StepReport};
pub use summary::Reporter;
