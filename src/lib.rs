//! Rollout - resumable, dependency-aware installation orchestration.
//!
//! Rollout runs a fixed set of installation steps (workspace setup, artifact
//! synchronization, infrastructure provisioning, migrations, deployment and
//! validation) as a dependency graph. Progress is persisted after every step
//! transition so an interrupted run can resume, and the deploy workflow rolls
//! back completed steps when a required step fails.
//!
//! # Modules
//!
//! - [`cancel`] - Cooperative cancellation and deadlines
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration loading, parsing, and validation
//! - [`error`] - Error types and result aliases
//! - [`installer`] - The install and deploy step graphs
//! - [`provision`] - Terraform and Makefile provisioning backends
//! - [`report`] - Run summaries and JSON reports
//! - [`runner`] - Dependency planning, scheduling, and rollback
//! - [`shell`] - Shell command execution
//! - [`state`] - Resumable run state
//! - [`steps`] - Step definitions and handlers
//! - [`sync`] - Bounded-concurrency artifact synchronization
//! - [`ui`] - Spinners and terminal output
//!
//! # Example
//!
//! ```
//! use rollout::runner::{RunOptions, Scheduler};
//! use rollout::state::StateStore;
//! use rollout::steps::{Step, StepContext};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = StateStore::open(dir.path().join("state.json"), "example", false).unwrap();
//!
//! let steps = vec![
//!     Step::new("setup", |_: &StepContext| Ok(())),
//!     Step::new("deploy", |_: &StepContext| Ok(())).depends_on(["setup"]),
//! ];
//!
//! let result = Scheduler::new(RunOptions::default()).run(&steps, &store).unwrap();
//! assert!(result.success());
//! assert_eq!(result.completed, 2);
//! ```

pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod installer;
pub mod provision;
pub mod report;
pub mod runner;
pub mod shell;
pub mod state;
pub mod steps;
pub mod sync;
pub mod ui;

pub use error::{Result, RolloutError};
