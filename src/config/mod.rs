//! Configuration loading, parsing, and validation for rollout.
//!
//! This module handles all aspects of configuration:
//! - Schema definitions in [`schema`]
//! - File discovery and loading in [`loader`]
//! - Validation in [`validator`]
//!
//! # Example
//!
//! ```
//! use rollout::config::{load_config, validate};
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! fs::write(temp.path().join("rollout.yml"), "name: acme").unwrap();
//!
//! let loaded = load_config(None, None, temp.path()).unwrap();
//! validate(&loaded.config).unwrap();
//! assert_eq!(loaded.config.name, Some("acme".to_string()));
//! ```
//!
//! # Configuration File Locations
//!
//! 1. `--config <path>`
//! 2. `<workspace>/rollout.yml`
//! 3. `./rollout.yml`
//!
//! Without a file, defaults apply: every step runs with no commands.

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::{
    discover_config, load_config, load_config_file, parse_config, LoadedConfig, CONFIG_FILE_NAME,
};
pub use schema::{
    InstallConfig, MakeTargets, ProvisionMode, ProvisioningConfig, RegistriesConfig,
    RegistryConfig, RepositoryConfig, Settings, StepConfig, SyncConfig,
};
pub use validator::{validate, validate_config, ValidationError};
