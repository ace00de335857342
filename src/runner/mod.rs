//! Step execution orchestration.
//!
//! - [`DependencyGraph`] - Validated step graph with cycle detection
//! - [`ExecutionPlan`] - Steps grouped into dependency levels
//! - [`Scheduler`] - Runs a plan sequentially or level by level
//! - [`RollbackCoordinator`] - Compensates applied steps on atomic failure

pub mod dependency;
pub mod events;
pub mod plan;
pub mod result;
pub mod rollback;
pub mod workflow;

pub use dependency::{DependencyGraph, DependencyGraphBuilder};
pub use events::{EventSink, RunEvent};
pub use plan::{ExecutionPlan, StepFilter};
pub use result::{CompletedStep, RunResult, SkipReason};
pub use rollback::{RollbackCoordinator, RollbackReport};
pub use workflow::{ExecutionMode, RunOptions, Scheduler};
