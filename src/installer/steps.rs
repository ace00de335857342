//! Step handlers for the installer workflows.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::InstallConfig;
use crate::error::{Result, RolloutError};
use crate::provision::ProvisionStrategy;
use crate::shell::{run_checked, CommandRunner};
use crate::steps::{Step, StepContext};
use crate::sync::registry::location_of;
use crate::sync::{
    ArtifactSynchronizer, CommandCopier, RegistrySource, DEFAULT_COPY_COMMAND, DEFAULT_SYNC_LIMIT,
};

use super::{Installer, PACKAGE_PULL, PROVISION_INFRA, SETUP};

impl Installer {
    /// Prepare the workspace and check out the repository.
    pub(super) fn setup_step(&self) -> Step {
        let config = Arc::clone(&self.config);
        let workspace = self.workspace.clone();
        let runner = Arc::clone(&self.runner);
        let commands = self.step_commands(SETUP);

        let mut step = Step::new(SETUP, move |ctx: &StepContext| {
            fs::create_dir_all(&workspace)?;
            debug!(workspace = %workspace.display(), "Workspace ready");

            if let Some(repo) = &config.repository {
                let checkout = workspace.join(&repo.path);
                if checkout.join(".git").exists() {
                    info!(step = ctx.step_name(), "Repository already checked out at {}", checkout.display());
                } else {
                    ctx.check_cancelled()?;
                    let branch = repo
                        .branch
                        .as_ref()
                        .map(|b| format!("--branch {} ", b))
                        .unwrap_or_default();
                    let clone = format!("git clone {}{} {}", branch, repo.url, repo.path.display());
                    run_checked(runner.as_ref(), &clone, &ctx.command_options(&workspace))?;
                }
            }

            run_commands(runner.as_ref(), &commands, &workspace, ctx)
        })
        .describe("Prepare workspace");

        if let Some(repo) = &self.config.repository {
            step = step.with_config("repository", repo.url.clone());
            if let Some(branch) = &repo.branch {
                step = step.with_config("branch", branch.clone());
            }
        }
        step
    }

    /// Copy configured artifacts into the target registry.
    pub(super) fn package_pull_step(&self) -> Result<Step> {
        let synchronizer = self.synchronizer()?;
        let artifacts = self.config.artifacts.clone();
        let workspace = self.workspace.clone();
        let runner = Arc::clone(&self.runner);
        let commands = self.step_commands(PACKAGE_PULL);

        let mut step = Step::new(PACKAGE_PULL, move |ctx: &StepContext| {
            match &synchronizer {
                Some(synchronizer) => {
                    let report = synchronizer.sync_all(&artifacts, ctx.cancel())?;
                    for warning in &report.warnings {
                        warn!(step = ctx.step_name(), "{}", warning);
                    }
                    info!(
                        step = ctx.step_name(),
                        synced = report.synced.len(),
                        warnings = report.warnings.len(),
                        "Artifacts synchronized"
                    );
                }
                None => debug!(step = ctx.step_name(), "No artifacts configured"),
            }
            run_commands(runner.as_ref(), &commands, &workspace, ctx)
        })
        .describe("Synchronize artifacts");

        let names: Vec<&str> = self.config.artifacts.iter().map(|a| a.name.as_str()).collect();
        if !names.is_empty() {
            step = step.with_config("artifacts", names.join(","));
        }
        Ok(step)
    }

    /// Provision infrastructure; the compensation tears it down.
    pub(super) fn provision_step(&self) -> Step {
        let strategy = self
            .config
            .provisioning
            .as_ref()
            .map(|p| ProvisionStrategy::from_config(p, &self.workspace));
        let workspace = self.workspace.clone();
        let runner = Arc::clone(&self.runner);
        let commands = self.step_commands(PROVISION_INFRA);

        let mut step = {
            let strategy = strategy.clone();
            let runner = Arc::clone(&runner);
            let workspace = workspace.clone();
            Step::new(PROVISION_INFRA, move |ctx: &StepContext| {
                if let Some(strategy) = &strategy {
                    strategy.provision(runner.as_ref(), ctx)?;
                }
                run_commands(runner.as_ref(), &commands, &workspace, ctx)
            })
            .describe("Provision infrastructure")
        };

        if let (Some(strategy), Some(provisioning)) = (strategy, &self.config.provisioning) {
            let rollback = self
                .config
                .step(PROVISION_INFRA)
                .map(|s| s.rollback.clone())
                .unwrap_or_default();
            step = step
                .with_config("provision.mode", format!("{:?}", provisioning.mode).to_lowercase())
                .with_config("provision.dir", provisioning.dir.display().to_string())
                .with_compensation(move |ctx: &StepContext| {
                    strategy.destroy(runner.as_ref(), ctx)?;
                    run_commands(runner.as_ref(), &rollback, &workspace, ctx)
                });
            if let Some(var_file) = &provisioning.var_file {
                step = step.with_config("provision.var_file", var_file.display().to_string());
            }
        }
        step
    }

    /// A step that only runs its configured commands.
    pub(super) fn commands_step(&self, name: &str, description: &str) -> Step {
        Step::new(name, self.commands_handler(self.step_commands(name))).describe(description)
    }

    pub(super) fn commands_handler(
        &self,
        commands: Vec<String>,
    ) -> impl Fn(&StepContext) -> Result<()> + Send + Sync + 'static {
        let workspace = self.workspace.clone();
        let runner = Arc::clone(&self.runner);
        move |ctx: &StepContext| run_commands(runner.as_ref(), &commands, &workspace, ctx)
    }

    fn step_commands(&self, name: &str) -> Vec<String> {
        self.config
            .step(name)
            .map(|s| s.commands.clone())
            .unwrap_or_default()
    }

    fn synchronizer(&self) -> Result<Option<ArtifactSynchronizer>> {
        let config: &InstallConfig = &self.config;
        if config.artifacts.is_empty() {
            return Ok(None);
        }
        let target = config
            .registries
            .target
            .as_ref()
            .ok_or_else(|| RolloutError::ConfigValidationError {
                message: "artifacts are configured but registries.target is not".to_string(),
            })?;

        let template = config
            .sync
            .copy_command
            .clone()
            .unwrap_or_else(|| DEFAULT_COPY_COMMAND.to_string());
        let copier = CommandCopier::new(
            template,
            location_of(target.url.trim_end_matches('/')),
            Arc::clone(&self.runner),
        )
        .in_dir(self.workspace.clone());

        let mut synchronizer = ArtifactSynchronizer::new(Arc::new(copier))
            .with_limit(config.sync.max_workers.unwrap_or(DEFAULT_SYNC_LIMIT));
        for (name, registry) in config.registries.sources() {
            synchronizer = synchronizer.with_source(Arc::new(RegistrySource::from_config(name, registry)?));
        }
        Ok(Some(synchronizer))
    }
}

/// Run `commands` in order from `cwd`, stopping at the first failure.
fn run_commands(
    runner: &dyn CommandRunner,
    commands: &[String],
    cwd: &Path,
    ctx: &StepContext,
) -> Result<()> {
    for command in commands {
        ctx.check_cancelled()?;
        info!(step = ctx.step_name(), "Running: {}", command);
        run_checked(runner, command, &ctx.command_options(cwd))?;
    }
    Ok(())
}
