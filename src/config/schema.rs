//! Configuration schema definitions for rollout.
//!
//! This module contains all the struct definitions that map to
//! the `rollout.yml` file format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::sync::{Artifact, DEFAULT_SYNC_LIMIT};

/// Root configuration structure for rollout.yml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallConfig {
    /// Installation name (for display purposes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Workspace directory; relative paths resolve against the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    /// Source repository checked out by `setup`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryConfig>,

    /// Global settings
    pub settings: Settings,

    /// Registries used by `package-pull`
    pub registries: RegistriesConfig,

    /// Artifacts to synchronize
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    /// Synchronizer settings
    pub sync: SyncConfig,

    /// Infrastructure provisioning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning: Option<ProvisioningConfig>,

    /// Per-step overrides, keyed by step name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub steps: BTreeMap<String, StepConfig>,
}

impl InstallConfig {
    /// Override for `name`, if configured.
    pub fn step(&self, name: &str) -> Option<&StepConfig> {
        self.steps.get(name)
    }
}

/// Git repository checked out into the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Checkout directory relative to the workspace.
    #[serde(default = "default_checkout_path")]
    pub path: PathBuf,
}

fn default_checkout_path() -> PathBuf {
    PathBuf::from("source")
}

/// Global settings that apply to every step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Run dependency levels on the worker pool
    #[serde(skip_serializing_if = "is_false")]
    pub parallel: bool,

    /// Maximum concurrent steps in parallel mode
    pub max_workers: usize,

    /// Keep running independent steps after a required failure
    #[serde(skip_serializing_if = "is_false")]
    pub continue_on_error: bool,

    /// Deadline for the whole run, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// State file location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: DEFAULT_SYNC_LIMIT,
            continue_on_error: false,
            timeout_secs: None,
            state_file: None,
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Registries consulted by the artifact synchronizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistriesConfig {
    /// Primary pull source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<RegistryConfig>,

    /// Fallback pull source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<RegistryConfig>,

    /// Destination registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<RegistryConfig>,
}

impl RegistriesConfig {
    /// Pull sources in lookup order.
    pub fn sources(&self) -> impl Iterator<Item = (&'static str, &RegistryConfig)> {
        [("vendor", self.vendor.as_ref()), ("client", self.client.as_ref())]
            .into_iter()
            .filter_map(|(name, config)| config.map(|c| (name, c)))
    }
}

/// One OCI registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Base URL, e.g. `https://registry.vendor.io`
    pub url: String,

    /// Environment variable holding a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

/// Synchronizer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Copy command template with `{source}`, `{target}` and `{artifact}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_command: Option<String>,

    /// Concurrent copies (defaults to 5)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
}

/// Provisioning backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionMode {
    Terraform,
    Makefile,
    Hybrid,
}

/// Infrastructure provisioning settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisioningConfig {
    pub mode: ProvisionMode,

    /// Directory holding the terraform module or Makefile, relative to the workspace
    #[serde(default = "default_infra_dir")]
    pub dir: PathBuf,

    /// Terraform variables file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_file: Option<PathBuf>,

    /// Make targets for each provisioning action
    #[serde(default)]
    pub targets: MakeTargets,
}

fn default_infra_dir() -> PathBuf {
    PathBuf::from("infra")
}

/// Make targets used by the makefile backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MakeTargets {
    pub init: String,
    pub validate: String,
    pub plan: String,
    pub apply: String,
    pub destroy: String,
}

impl Default for MakeTargets {
    fn default() -> Self {
        Self {
            init: "init".to_string(),
            validate: "validate".to_string(),
            plan: "plan".to_string(),
            apply: "apply".to_string(),
            destroy: "destroy".to_string(),
        }
    }
}

/// Overrides for a single step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Commands run in the workspace, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    /// Compensating commands run on atomic rollback
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<String>,

    /// Override the step's required flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    /// Per-step timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}
