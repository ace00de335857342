//! Configuration file discovery and loading.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::schema::InstallConfig;
use crate::error::{Result, RolloutError};

/// Configuration file name looked up in the workspace and working directory.
pub const CONFIG_FILE_NAME: &str = "rollout.yml";

/// A parsed configuration and where it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: InstallConfig,
    /// `None` when no file was found and defaults are in effect.
    pub path: Option<PathBuf>,
}

impl LoadedConfig {
    /// Workspace for this run.
    ///
    /// An explicit `--workspace` wins; otherwise the configured workspace,
    /// resolved against the config file's directory; otherwise `cwd`.
    pub fn resolve_workspace(&self, explicit: Option<&Path>, cwd: &Path) -> PathBuf {
        if let Some(path) = explicit {
            return absolutize(path, cwd);
        }
        match &self.config.workspace {
            Some(path) => {
                let base = self
                    .path
                    .as_deref()
                    .and_then(Path::parent)
                    .map(|dir| absolutize(dir, cwd))
                    .unwrap_or_else(|| cwd.to_path_buf());
                absolutize(path, &base)
            }
            None => cwd.to_path_buf(),
        }
    }
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Find the configuration file.
///
/// Order: `explicit` (must exist), `<workspace>/rollout.yml`,
/// `<cwd>/rollout.yml`. Returns `None` if nothing was found.
pub fn discover_config(
    explicit: Option<&Path>,
    workspace: Option<&Path>,
    cwd: &Path,
) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        let path = absolutize(path, cwd);
        if !path.is_file() {
            return Err(RolloutError::ConfigNotFound { path });
        }
        return Ok(Some(path));
    }

    let candidates = workspace
        .map(|w| absolutize(w, cwd).join(CONFIG_FILE_NAME))
        .into_iter()
        .chain(std::iter::once(cwd.join(CONFIG_FILE_NAME)));

    for candidate in candidates {
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
        debug!("No config at {}", candidate.display());
    }
    Ok(None)
}

/// Discover and load the configuration, falling back to defaults.
pub fn load_config(
    explicit: Option<&Path>,
    workspace: Option<&Path>,
    cwd: &Path,
) -> Result<LoadedConfig> {
    match discover_config(explicit, workspace, cwd)? {
        Some(path) => {
            let config = load_config_file(&path)?;
            debug!("Loaded config from {}", path.display());
            Ok(LoadedConfig {
                config,
                path: Some(path),
            })
        }
        None => Ok(LoadedConfig::default()),
    }
}

/// Load a single config file and parse it into InstallConfig.
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist.
/// Returns `ConfigParseError` if the YAML is invalid.
pub fn load_config_file(path: &Path) -> Result<InstallConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RolloutError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            RolloutError::Io(e)
        }
    })?;

    parse_config(&content, path)
}

/// Parse YAML content into InstallConfig.
pub fn parse_config(content: &str, source_path: &Path) -> Result<InstallConfig> {
    if content.trim().is_empty() {
        return Ok(InstallConfig::default());
    }
    serde_yaml::from_str(content).map_err(|e| RolloutError::ConfigParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_path_must_exist() {
        let temp = TempDir::new().unwrap();
        let result = discover_config(Some(Path::new("missing.yml")), None, temp.path());
        assert!(matches!(result, Err(RolloutError::ConfigNotFound { .. })));
    }

    #[test]
    fn workspace_config_wins_over_cwd() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("ws");
        fs::create_dir_all(&workspace).unwrap();
        fs::write(workspace.join(CONFIG_FILE_NAME), "name: ws").unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), "name: cwd").unwrap();

        let loaded = load_config(None, Some(Path::new("ws")), temp.path()).unwrap();
        assert_eq!(loaded.config.name.as_deref(), Some("ws"));
    }

    #[test]
    fn falls_back_to_cwd_then_defaults() {
        let temp = TempDir::new().unwrap();
        let loaded = load_config(None, None, temp.path()).unwrap();
        assert!(loaded.path.is_none());

        fs::write(temp.path().join(CONFIG_FILE_NAME), "name: cwd").unwrap();
        let loaded = load_config(None, None, temp.path()).unwrap();
        assert_eq!(loaded.config.name.as_deref(), Some("cwd"));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "settings: [unclosed").unwrap();

        let result = load_config_file(&path);
        assert!(matches!(result, Err(RolloutError::ConfigParseError { .. })));
    }

    #[test]
    fn empty_file_is_default_config() {
        let config = parse_config("\n", Path::new("rollout.yml")).unwrap();
        assert_eq!(config, InstallConfig::default());
    }

    #[test]
    fn configured_workspace_is_relative_to_config_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("conf");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE_NAME), "workspace: ../deploy").unwrap();

        let loaded =
            load_config(Some(Path::new("conf/rollout.yml")), None, temp.path()).unwrap();
        let workspace = loaded.resolve_workspace(None, temp.path());
        assert_eq!(workspace, dir.join("../deploy"));

        let explicit = loaded.resolve_workspace(Some(Path::new("other")), temp.path());
        assert_eq!(explicit, temp.path().join("other"));
    }
}
