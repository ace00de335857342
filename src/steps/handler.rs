//! Step handlers and their execution context.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::runner::RunOptions;
use crate::shell::CommandOptions;

/// Work performed by a step, or its compensation.
///
/// Any `Fn(&StepContext) -> Result<()>` closure is a handler.
pub trait StepHandler: Send + Sync {
    fn run(&self, ctx: &StepContext) -> Result<()>;
}

impl<F> StepHandler for F
where
    F: Fn(&StepContext) -> Result<()> + Send + Sync,
{
    fn run(&self, ctx: &StepContext) -> Result<()> {
        self(ctx)
    }
}

/// What a handler can see while it runs.
#[derive(Debug, Clone)]
pub struct StepContext {
    step: String,
    options: Arc<RunOptions>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl StepContext {
    pub fn new(
        step: impl Into<String>,
        options: Arc<RunOptions>,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            step: step.into(),
            options,
            cancel,
            timeout,
        }
    }

    /// Name of the running step.
    pub fn step_name(&self) -> &str {
        &self.step
    }

    /// Options of the enclosing run.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run-wide cancellation token.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Per-step timeout, if one applies.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Fail fast if the run has been cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Command options for a subprocess started by this step.
    ///
    /// The subprocess inherits the step timeout and the run cancellation, and
    /// sees `ROLLOUT_STEP` in its environment.
    pub fn command_options(&self, cwd: &Path) -> CommandOptions {
        let mut env = HashMap::new();
        env.insert("ROLLOUT_STEP".to_string(), self.step.clone());
        env.insert(
            "ROLLOUT_WORKSPACE".to_string(),
            cwd.to_string_lossy().into_owned(),
        );
        CommandOptions {
            cwd: Some(cwd.to_path_buf()),
            env,
            timeout: self.timeout,
            cancel: Some(self.cancel.clone()),
            ..CommandOptions::captured()
        }
    }
}
