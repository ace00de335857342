//! Configuration and paths shared by commands.

use std::path::{Path, PathBuf};

use crate::config::{load_config, InstallConfig};
use crate::error::Result;
use crate::state::DEFAULT_STATE_FILE;

/// Resolved configuration, workspace and working directory.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: InstallConfig,
    /// `None` when running on defaults.
    pub config_path: Option<PathBuf>,
    pub workspace: PathBuf,
    pub cwd: PathBuf,
}

impl CommandContext {
    /// Discover and load configuration for the given global flags.
    pub fn load(config: Option<&Path>, workspace: Option<&Path>, cwd: &Path) -> Result<Self> {
        let loaded = load_config(config, workspace, cwd)?;
        let workspace = loaded.resolve_workspace(workspace, cwd);
        Ok(Self {
            config: loaded.config,
            config_path: loaded.path,
            workspace,
            cwd: cwd.to_path_buf(),
        })
    }

    /// State file location.
    ///
    /// `--state-file` (relative to the working directory) wins, then
    /// `settings.state_file` (relative to the workspace), then the default
    /// file in the workspace.
    pub fn state_path(&self, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return self.cwd.join(path);
        }
        let configured = self
            .config
            .settings
            .state_file
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_STATE_FILE));
        self.workspace.join(configured)
    }

    /// Display name of the installation.
    pub fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or("rollout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_config() {
        let temp = TempDir::new().unwrap();
        let ctx = CommandContext::load(None, None, temp.path()).unwrap();

        assert!(ctx.config_path.is_none());
        assert_eq!(ctx.workspace, temp.path());
        assert_eq!(ctx.state_path(None), temp.path().join(DEFAULT_STATE_FILE));
        assert_eq!(ctx.name(), "rollout");
    }

    #[test]
    fn state_path_precedence() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("rollout.yml"),
            "name: acme\nsettings:\n  state_file: state/run.json\n",
        )
        .unwrap();
        let ctx = CommandContext::load(None, Some(Path::new("ws")), temp.path()).unwrap();

        assert_eq!(ctx.workspace, temp.path().join("ws"));
        assert_eq!(ctx.state_path(None), temp.path().join("ws/state/run.json"));
        assert_eq!(
            ctx.state_path(Some(Path::new("custom.json"))),
            temp.path().join("custom.json")
        );
        assert_eq!(ctx.name(), "acme");
    }
}
