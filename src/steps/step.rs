//! Step definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::state::fingerprint;

use super::handler::{StepContext, StepHandler};

/// A named unit of work in a workflow.
///
/// Steps are required unless marked [`optional`](Step::optional). A failed
/// required step blocks its dependents; a failed optional step does not.
#[derive(Clone)]
pub struct Step {
    /// Unique step name.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// Whether failure of this step fails the run.
    pub required: bool,

    /// Names of steps that must complete first, without duplicates.
    pub dependencies: Vec<String>,

    /// Per-step timeout.
    pub timeout: Option<Duration>,

    /// Inputs folded into the step fingerprint.
    pub config: BTreeMap<String, String>,

    handler: Arc<dyn StepHandler>,
    compensation: Option<Arc<dyn StepHandler>>,
}

impl Step {
    /// Create a required step running `handler`.
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&StepContext) -> Result<()> + Send + Sync + 'static,
    {
        Self::with_handler(name, Arc::new(handler))
    }

    /// Create a required step from a shared handler.
    pub fn with_handler(name: impl Into<String>, handler: Arc<dyn StepHandler>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            required: true,
            dependencies: Vec::new(),
            timeout: None,
            config: BTreeMap::new(),
            handler,
            compensation: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the step optional.
    pub fn optional(self) -> Self {
        self.with_required(false)
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Add dependencies, ignoring names already present.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dependency in dependencies {
            let dependency = dependency.into();
            if !self.dependencies.contains(&dependency) {
                self.dependencies.push(dependency);
            }
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Record a configuration input for the fingerprint.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Attach a compensating action run on atomic rollback.
    pub fn with_compensation<F>(self, compensation: F) -> Self
    where
        F: Fn(&StepContext) -> Result<()> + Send + Sync + 'static,
    {
        self.with_compensation_handler(Arc::new(compensation))
    }

    pub fn with_compensation_handler(mut self, compensation: Arc<dyn StepHandler>) -> Self {
        self.compensation = Some(compensation);
        self
    }

    pub fn handler(&self) -> &dyn StepHandler {
        self.handler.as_ref()
    }

    pub fn compensation(&self) -> Option<&dyn StepHandler> {
        self.compensation.as_deref()
    }

    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }

    /// Stable hash of the step's name, dependencies and configuration.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.name, &self.dependencies, &self.config)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("config", &self.config)
            .field("compensation", &self.compensation.is_some())
            .finish()
    }
}
