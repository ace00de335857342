//! Configuration validation rules.
//!
//! This module validates configuration for correctness:
//! - Step overrides must name a known step
//! - Worker caps must be positive
//! - Artifacts need a name, a pull source and a target registry
//! - Repository and provisioning settings must not be empty

use crate::config::schema::InstallConfig;
use crate::error::{Result, RolloutError};
use crate::installer::STEP_NAMES;

/// Validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Rule identifier
    pub rule: &'static str,
    /// Human-readable error message
    pub message: String,
}

impl ValidationError {
    fn new(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

/// Validate a configuration and return all errors.
///
/// This function collects all validation errors rather than stopping
/// at the first one, allowing users to fix multiple issues at once.
pub fn validate_config(config: &InstallConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for name in config.steps.keys() {
        if !STEP_NAMES.contains(&name.as_str()) {
            errors.push(ValidationError::new(
                "unknown-step",
                format!(
                    "Unknown step '{}' in steps (expected one of: {})",
                    name,
                    STEP_NAMES.join(", ")
                ),
            ));
        }
    }

    if config.settings.max_workers == 0 {
        errors.push(ValidationError::new(
            "max-workers",
            "settings.max_workers must be at least 1",
        ));
    }
    if config.sync.max_workers == Some(0) {
        errors.push(ValidationError::new(
            "max-workers",
            "sync.max_workers must be at least 1",
        ));
    }

    for (i, artifact) in config.artifacts.iter().enumerate() {
        if artifact.name.trim().is_empty() {
            errors.push(ValidationError::new(
                "artifact-name",
                format!("artifacts[{}] has an empty name", i),
            ));
        }
    }
    if !config.artifacts.is_empty() {
        if config.registries.sources().next().is_none() {
            errors.push(ValidationError::new(
                "artifact-source",
                "artifacts are listed but neither registries.vendor nor registries.client is set",
            ));
        }
        if config.registries.target.is_none() {
            errors.push(ValidationError::new(
                "artifact-target",
                "artifacts are listed but registries.target is not set",
            ));
        }
    }

    if let Some(repository) = &config.repository {
        if repository.url.trim().is_empty() {
            errors.push(ValidationError::new("repository", "repository.url is empty"));
        }
    }

    if let Some(provisioning) = &config.provisioning {
        if provisioning.dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "provisioning-dir",
                "provisioning.dir is empty",
            ));
        }
    }

    errors
}

/// Validate and return Result.
pub fn validate(config: &InstallConfig) -> Result<()> {
    let errors = validate_config(config);

    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<_> = errors.iter().map(|e| e.message.clone()).collect();
        Err(RolloutError::ConfigValidationError {
            message: messages.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RegistryConfig, StepConfig};
    use crate::sync::Artifact;

    fn registry(url: &str) -> Option<RegistryConfig> {
        Some(RegistryConfig {
            url: url.to_string(),
            token_env: None,
        })
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&InstallConfig::default()).is_ok());
    }

    #[test]
    fn unknown_step_override_is_rejected() {
        let mut config = InstallConfig::default();
        config
            .steps
            .insert("deploy-everything".to_string(), StepConfig::default());

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule, "unknown-step");
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = InstallConfig::default();
        config.settings.max_workers = 0;
        config.sync.max_workers = Some(0);
        assert_eq!(validate_config(&config).len(), 2);
    }

    #[test]
    fn artifacts_require_source_and_target() {
        let mut config = InstallConfig::default();
        config.artifacts.push(Artifact::required(""));

        let rules: Vec<_> = validate_config(&config).iter().map(|e| e.rule).collect();
        assert_eq!(rules, vec!["artifact-name", "artifact-source", "artifact-target"]);

        config.artifacts[0].name = "platform/api:1.0".into();
        config.registries.client = registry("https://registry.client.local");
        config.registries.target = registry("https://registry.internal");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn errors_are_joined() {
        let mut config = InstallConfig::default();
        config.settings.max_workers = 0;
        config.steps.insert("nope".into(), StepConfig::default());

        let err = validate(&config).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("max_workers"));
    }
}
