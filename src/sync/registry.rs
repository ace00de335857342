//! OCI registry sources.
//!
//! A [`RegistrySource`] answers existence checks with a `HEAD` against the
//! distribution API manifest endpoint.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{Result, RolloutError};

use super::artifact::{Artifact, ArtifactSource};

/// Manifest media types accepted on existence checks.
pub const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.docker.distribution.manifest.v2+json";

/// Default request timeout for registry checks.
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

/// A header attached to every registry request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    /// Header name (e.g., "Authorization").
    pub header_name: String,
    /// Header value (e.g., "Bearer token123").
    pub header_value: String,
}

impl AuthHeader {
    /// Create a Bearer token auth header.
    pub fn bearer(token: &str) -> Self {
        Self {
            header_name: "Authorization".to_string(),
            header_value: format!("Bearer {}", token),
        }
    }
}

/// Resolve a bearer token from `token_env`, checking `env_vars` before the
/// process environment.
pub fn resolve_auth(token_env: &str, env_vars: &HashMap<String, String>) -> Option<AuthHeader> {
    env_vars
        .get(token_env)
        .cloned()
        .or_else(|| std::env::var(token_env).ok())
        .filter(|token| !token.is_empty())
        .map(|token| AuthHeader::bearer(&token))
}

/// A registry reachable over the distribution API.
pub struct RegistrySource {
    name: String,
    base_url: String,
    location: String,
    auth: Option<AuthHeader>,
    client: reqwest::blocking::Client,
}

impl RegistrySource {
    /// Create a source for the registry at `base_url`.
    pub fn new(name: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RolloutError::Registry {
                url: base_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: name.into(),
            location: location_of(&base_url).to_string(),
            base_url,
            auth: None,
            client,
        })
    }

    /// Build a source from configuration, resolving its token from the environment.
    pub fn from_config(name: impl Into<String>, config: &RegistryConfig) -> Result<Self> {
        let mut source = Self::new(name, &config.url, DEFAULT_REGISTRY_TIMEOUT)?;
        if let Some(token_env) = &config.token_env {
            source.auth = resolve_auth(token_env, &HashMap::new());
            if source.auth.is_none() {
                debug!(registry = %source.name, "Token variable {} is not set", token_env);
            }
        }
        Ok(source)
    }

    /// Attach an auth header.
    pub fn with_auth(mut self, auth: AuthHeader) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Manifest endpoint for `artifact`.
    pub fn manifest_url(&self, artifact: &Artifact) -> String {
        let (repository, reference) = artifact.reference();
        format!("{}/v2/{}/manifests/{}", self.base_url, repository, reference)
    }
}

impl ArtifactSource for RegistrySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn contains(&self, artifact: &Artifact) -> Result<bool> {
        let url = self.manifest_url(artifact);
        let mut request = self.client.head(&url).header(ACCEPT, MANIFEST_ACCEPT);
        if let Some(auth) = &self.auth {
            request = request.header(&auth.header_name, &auth.header_value);
        }

        let response = request.send().map_err(|e| RolloutError::Registry {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        debug!(registry = %self.name, %url, status = status.as_u16(), "Manifest check");
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(RolloutError::Registry {
                url,
                message: format!("HTTP {}", status),
            })
        }
    }
}

/// Strip the scheme from a registry URL.
pub(crate) fn location_of(base_url: &str) -> &str {
    base_url
        .strip_prefix("https://")
        .or_else(|| base_url.strip_prefix("http://"))
        .unwrap_or(base_url)
}
