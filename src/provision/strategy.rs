//! Provisioning strategies.
//!
//! The strategy is chosen once from configuration. Each action maps to one
//! command per backend; the hybrid strategy runs terraform first and the
//! Makefile second, and tears down in the opposite order.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{MakeTargets, ProvisionMode, ProvisioningConfig};
use crate::error::Result;
use crate::shell::{run_checked, CommandRunner};
use crate::steps::StepContext;

/// A provisioning lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionAction {
    Init,
    Validate,
    Plan,
    Apply,
    Destroy,
}

impl ProvisionAction {
    /// Actions run by `provision`, in order.
    pub const PROVISION: [ProvisionAction; 4] = [Self::Init, Self::Validate, Self::Plan, Self::Apply];
}

impl fmt::Display for ProvisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Validate => "validate",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        })
    }
}

/// Terraform module in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformBackend {
    pub dir: PathBuf,
    pub var_file: Option<PathBuf>,
}

impl TerraformBackend {
    pub fn command(&self, action: ProvisionAction) -> String {
        let var_file = self
            .var_file
            .as_ref()
            .map(|f| format!(" -var-file={}", f.display()))
            .unwrap_or_default();
        match action {
            ProvisionAction::Init => "terraform init -input=false".to_string(),
            ProvisionAction::Validate => "terraform validate".to_string(),
            ProvisionAction::Plan => format!("terraform plan -input=false -out=tfplan{}", var_file),
            ProvisionAction::Apply => "terraform apply -input=false -auto-approve tfplan".to_string(),
            ProvisionAction::Destroy => {
                format!("terraform destroy -input=false -auto-approve{}", var_file)
            }
        }
    }
}

/// Makefile with one target per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakefileBackend {
    pub dir: PathBuf,
    pub targets: MakeTargets,
}

impl MakefileBackend {
    pub fn command(&self, action: ProvisionAction) -> String {
        let target = match action {
            ProvisionAction::Init => &self.targets.init,
            ProvisionAction::Validate => &self.targets.validate,
            ProvisionAction::Plan => &self.targets.plan,
            ProvisionAction::Apply => &self.targets.apply,
            ProvisionAction::Destroy => &self.targets.destroy,
        };
        format!("make {}", target)
    }
}

/// How `provision-infra` provisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStrategy {
    Terraform(TerraformBackend),
    Makefile(MakefileBackend),
    Hybrid {
        terraform: TerraformBackend,
        makefile: MakefileBackend,
    },
}

impl ProvisionStrategy {
    /// Select the strategy for `config`, resolving paths against `workspace`.
    pub fn from_config(config: &ProvisioningConfig, workspace: &Path) -> Self {
        let dir = workspace.join(&config.dir);
        let terraform = || TerraformBackend {
            dir: dir.clone(),
            var_file: config.var_file.clone(),
        };
        let makefile = || MakefileBackend {
            dir: dir.clone(),
            targets: config.targets.clone(),
        };
        match config.mode {
            ProvisionMode::Terraform => Self::Terraform(terraform()),
            ProvisionMode::Makefile => Self::Makefile(makefile()),
            ProvisionMode::Hybrid => Self::Hybrid {
                terraform: terraform(),
                makefile: makefile(),
            },
        }
    }

    pub fn mode(&self) -> ProvisionMode {
        match self {
            Self::Terraform(_) => ProvisionMode::Terraform,
            Self::Makefile(_) => ProvisionMode::Makefile,
            Self::Hybrid { .. } => ProvisionMode::Hybrid,
        }
    }

    /// Commands for `action` with the directory each runs in.
    pub fn commands(&self, action: ProvisionAction) -> Vec<(PathBuf, String)> {
        match self {
            Self::Terraform(tf) => vec![(tf.dir.clone(), tf.command(action))],
            Self::Makefile(mk) => vec![(mk.dir.clone(), mk.command(action))],
            Self::Hybrid {
                terraform,
                makefile,
            } => {
                let tf = (terraform.dir.clone(), terraform.command(action));
                let mk = (makefile.dir.clone(), makefile.command(action));
                if action == ProvisionAction::Destroy {
                    vec![mk, tf]
                } else {
                    vec![tf, mk]
                }
            }
        }
    }

    pub fn init(&self, runner: &dyn CommandRunner, ctx: &StepContext) -> Result<()> {
        self.run(ProvisionAction::Init, runner, ctx)
    }

    pub fn validate(&self, runner: &dyn CommandRunner, ctx: &StepContext) -> Result<()> {
        self.run(ProvisionAction::Validate, runner, ctx)
    }

    pub fn plan(&self, runner: &dyn CommandRunner, ctx: &StepContext) -> Result<()> {
        self.run(ProvisionAction::Plan, runner, ctx)
    }

    pub fn apply(&self, runner: &dyn CommandRunner, ctx: &StepContext) -> Result<()> {
        self.run(ProvisionAction::Apply, runner, ctx)
    }

    pub fn destroy(&self, runner: &dyn CommandRunner, ctx: &StepContext) -> Result<()> {
        self.run(ProvisionAction::Destroy, runner, ctx)
    }

    /// Run init, validate, plan and apply, stopping at the first failure.
    pub fn provision(&self, runner: &dyn CommandRunner, ctx: &StepContext) -> Result<()> {
        for action in ProvisionAction::PROVISION {
            self.run(action, runner, ctx)?;
        }
        Ok(())
    }

    fn run(&self, action: ProvisionAction, runner: &dyn CommandRunner, ctx: &StepContext) -> Result<()> {
        for (dir, command) in self.commands(action) {
            ctx.check_cancelled()?;
            info!(step = ctx.step_name(), %action, "Provisioning");
            run_checked(runner, &command, &ctx.command_options(&dir))?;
        }
        Ok(())
    }
}
