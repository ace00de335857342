//! Command-driven artifact copier.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::shell::{run_checked, CommandOptions, CommandRunner};

use super::artifact::{Artifact, ArtifactCopier, ArtifactSource};

/// Copy command used when none is configured.
pub const DEFAULT_COPY_COMMAND: &str =
    "skopeo copy --all docker://{source}/{artifact} docker://{target}/{artifact}";

/// Copies artifacts by running a templated shell command.
///
/// The template may reference `{source}`, `{target}` and `{artifact}`.
pub struct CommandCopier {
    template: String,
    target: String,
    cwd: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
}

impl CommandCopier {
    pub fn new(
        template: impl Into<String>,
        target: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            template: template.into(),
            target: target.into(),
            cwd: None,
            runner,
        }
    }

    /// Run copy commands from `cwd`.
    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Expand the template for one artifact.
    pub fn render(&self, artifact: &Artifact, source: &dyn ArtifactSource) -> String {
        self.template
            .replace("{source}", source.location())
            .replace("{target}", &self.target)
            .replace("{artifact}", &artifact.name)
    }
}

impl ArtifactCopier for CommandCopier {
    fn copy(
        &self,
        artifact: &Artifact,
        source: &dyn ArtifactSource,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let command = self.render(artifact, source);
        let options = CommandOptions {
            cwd: self.cwd.clone(),
            cancel: Some(cancel.clone()),
            ..CommandOptions::captured()
        };
        run_checked(self.runner.as_ref(), &command, &options)?;
        Ok(())
    }
}
