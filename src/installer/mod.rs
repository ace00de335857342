//! Installation and deployment workflows.
//!
//! The [`Installer`] turns an [`InstallConfig`] into the step graphs the
//! scheduler runs:
//!
//! ```text
//! setup -> package-pull -> provision-infra -> db-migrate (optional)
//!                                          -> deploy -> post-validate (optional)
//!                                                    -> e2e-test (optional)
//! ```
//!
//! The deployment workflow is the atomic `db-migrate -> deploy -> post-validate`
//! chain, where every step is required and compensated by its configured
//! `rollback` commands.

mod steps;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::InstallConfig;
use crate::error::Result;
use crate::shell::CommandRunner;
use crate::steps::Step;

pub const SETUP: &str = "setup";
pub const PACKAGE_PULL: &str = "package-pull";
pub const PROVISION_INFRA: &str = "provision-infra";
pub const DB_MIGRATE: &str = "db-migrate";
pub const DEPLOY: &str = "deploy";
pub const POST_VALIDATE: &str = "post-validate";
pub const E2E_TEST: &str = "e2e-test";

/// Every step name a configuration may override.
pub const STEP_NAMES: [&str; 7] = [
    SETUP,
    PACKAGE_PULL,
    PROVISION_INFRA,
    DB_MIGRATE,
    DEPLOY,
    POST_VALIDATE,
    E2E_TEST,
];

/// Which step graph to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    Install,
    Deploy,
}

impl Workflow {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Deploy => "deploy",
        }
    }

    /// Whether a required failure compensates applied steps.
    pub fn atomic(&self) -> bool {
        matches!(self, Self::Deploy)
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds workflow steps from configuration.
pub struct Installer {
    config: Arc<InstallConfig>,
    workspace: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Installer {
    pub fn new(
        config: InstallConfig,
        workspace: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            workspace: workspace.into(),
            runner,
        }
    }

    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Steps of `workflow`, in registration order.
    pub fn steps(&self, workflow: Workflow) -> Result<Vec<Step>> {
        match workflow {
            Workflow::Install => self.install_steps(),
            Workflow::Deploy => self.deploy_steps(),
        }
    }

    /// The seven-step installation graph.
    pub fn install_steps(&self) -> Result<Vec<Step>> {
        Ok(vec![
            self.configure(self.setup_step(), true),
            self.configure(self.package_pull_step()?.depends_on([SETUP]), true),
            self.configure(self.provision_step().depends_on([PACKAGE_PULL]), true),
            self.configure(
                self.commands_step(DB_MIGRATE, "Run database migrations")
                    .depends_on([PROVISION_INFRA]),
                false,
            ),
            self.configure(
                self.commands_step(DEPLOY, "Deploy services")
                    .depends_on([PROVISION_INFRA]),
                true,
            ),
            self.configure(
                self.commands_step(POST_VALIDATE, "Validate deployment")
                    .depends_on([DEPLOY]),
                false,
            ),
            self.configure(
                self.commands_step(E2E_TEST, "Run end-to-end tests")
                    .depends_on([DEPLOY]),
                false,
            ),
        ])
    }

    /// The atomic deployment chain.
    pub fn deploy_steps(&self) -> Result<Vec<Step>> {
        Ok(vec![
            self.configure(self.commands_step(DB_MIGRATE, "Run database migrations"), true),
            self.configure(
                self.commands_step(DEPLOY, "Deploy services")
                    .depends_on([DB_MIGRATE]),
                true,
            ),
            self.configure(
                self.commands_step(POST_VALIDATE, "Validate deployment")
                    .depends_on([DEPLOY]),
                true,
            ),
        ])
    }

    /// Apply per-step overrides and attach rollback commands.
    fn configure(&self, step: Step, required: bool) -> Step {
        let Some(overrides) = self.config.step(&step.name) else {
            return step.with_required(required);
        };

        let mut step = step.with_required(overrides.required.unwrap_or(required));
        if let Some(description) = &overrides.description {
            step = step.describe(description.clone());
        }
        if let Some(secs) = overrides.timeout_secs {
            step = step.with_timeout(Duration::from_secs(secs));
        }
        if !overrides.commands.is_empty() {
            step = step.with_config("commands", overrides.commands.join("\n"));
        }
        if !overrides.rollback.is_empty() {
            step = step.with_config("rollback", overrides.rollback.join("\n"));
            // provision-infra folds its rollback commands into the destroy compensation
            if !step.has_compensation() {
                step = step.with_compensation(self.commands_handler(overrides.rollback.clone()));
            }
        }
        step
    }
}
