//! Steps: named units of work with dependencies and optional compensation.
//!
//! - [`Step`] - A step definition
//! - [`StepHandler`] - The work a step performs
//! - [`StepContext`] - What a handler sees while running

pub mod handler;
pub mod step;

pub use handler::{StepContext, StepHandler};
pub use step::Step;
