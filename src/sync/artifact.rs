//! Artifact synchronization across registries.
//!
//! An [`ArtifactSynchronizer`] copies a list of artifacts (container images,
//! charts) into the target registry using the bounded task pool. Each
//! artifact is looked up in the configured sources in order, so a missing
//! image in the vendor registry falls back to the client registry before the
//! task is declared failed. Per-artifact `required` flags decide whether a
//! failure fails the sync or only produces a warning.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::{Result, RolloutError};

use super::pool::{run_all, AggregateSyncError, SyncTask, DEFAULT_SYNC_LIMIT};

fn default_true() -> bool {
    true
}

/// An artifact to synchronize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    /// Repository reference relative to the registry, e.g. `platform/api:1.4.2`.
    pub name: String,

    /// Whether a sync failure for this artifact fails the step.
    #[serde(default = "default_true")]
    pub required: bool,
}

impl Artifact {
    /// Create a required artifact.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    /// Create an optional artifact.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }

    /// Split the reference into repository and tag (or digest).
    ///
    /// A reference without a tag resolves to `latest`.
    pub fn reference(&self) -> (&str, &str) {
        if let Some((repo, digest)) = self.name.split_once('@') {
            return (repo, digest);
        }
        let last_segment = self.name.rfind('/').map_or(0, |i| i + 1);
        match self.name[last_segment..].rfind(':') {
            Some(i) => {
                let split = last_segment + i;
                (&self.name[..split], &self.name[split + 1..])
            }
            None => (&self.name, "latest"),
        }
    }
}

/// A place artifacts can be pulled from.
pub trait ArtifactSource: Send + Sync {
    /// Human-readable source name (e.g. `vendor`).
    fn name(&self) -> &str;

    /// Base location used when building copy commands.
    fn location(&self) -> &str;

    /// Whether the source holds the artifact.
    fn contains(&self, artifact: &Artifact) -> Result<bool>;
}

/// Copies an artifact from a source into the target.
pub trait ArtifactCopier: Send + Sync {
    fn copy(
        &self,
        artifact: &Artifact,
        source: &dyn ArtifactSource,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Summary of a completed sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Artifacts copied successfully, with the source each came from.
    pub synced: Vec<(String, String)>,
    /// Failures of optional artifacts.
    pub warnings: Vec<String>,
}

/// Copies artifacts through the bounded task pool.
pub struct ArtifactSynchronizer {
    sources: Vec<Arc<dyn ArtifactSource>>,
    copier: Arc<dyn ArtifactCopier>,
    limit: usize,
}

impl ArtifactSynchronizer {
    /// Create a synchronizer with no sources.
    pub fn new(copier: Arc<dyn ArtifactCopier>) -> Self {
        Self {
            sources: Vec::new(),
            copier,
            limit: DEFAULT_SYNC_LIMIT,
        }
    }

    /// Append a source; sources are consulted in insertion order.
    pub fn with_source(mut self, source: Arc<dyn ArtifactSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Set the concurrency cap.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Concurrency cap.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Find the first source that holds `artifact`.
    pub fn resolve_source(&self, artifact: &Artifact) -> Result<&dyn ArtifactSource> {
        for source in &self.sources {
            match source.contains(artifact) {
                Ok(true) => return Ok(&**source),
                Ok(false) => {
                    debug!(artifact = %artifact.name, source = source.name(), "Artifact not in source");
                }
                Err(e) => {
                    warn!(
                        artifact = %artifact.name,
                        source = source.name(),
                        "Existence check failed: {}",
                        e
                    );
                }
            }
        }

        let names: Vec<_> = self.sources.iter().map(|s| s.name()).collect();
        Err(RolloutError::ArtifactNotFound {
            artifact: artifact.name.clone(),
            sources: if names.is_empty() {
                "no configured sources".to_string()
            } else {
                names.join(" or ")
            },
        })
    }

    /// Synchronize every artifact.
    ///
    /// Fails with [`RolloutError::Sync`] listing every required artifact that
    /// could not be copied. Optional failures are returned as warnings.
    pub fn sync_all(&self, artifacts: &[Artifact], cancel: &CancellationToken) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        if artifacts.is_empty() {
            return Ok(report);
        }

        let sources_used: Vec<std::sync::Mutex<Option<String>>> =
            artifacts.iter().map(|_| std::sync::Mutex::new(None)).collect();

        let worker = |task: &SyncTask<&Artifact>| -> Result<()> {
            cancel.check()?;
            let artifact = task.payload;
            let source = self.resolve_source(artifact)?;
            self.copier.copy(artifact, source, cancel)?;
            if let Ok(mut slot) = sources_used[task.index].lock() {
                *slot = Some(source.name().to_string());
            }
            Ok(())
        };

        let result = run_all(
            SyncTask::batch(artifacts.iter()),
            worker,
            self.limit,
            |outcome| {
                let artifact = &artifacts[outcome.index];
                match &outcome.error {
                    None => info!(artifact = %artifact.name, "Synchronized"),
                    Some(e) if artifact.required => {
                        warn!(artifact = %artifact.name, "Required artifact failed: {}", e)
                    }
                    Some(e) => warn!(artifact = %artifact.name, "Optional artifact skipped: {}", e),
                }
            },
        );

        let mut required_failures = Vec::new();
        if let Err(aggregate) = result {
            for failure in aggregate.into_failures() {
                let artifact = &artifacts[failure.index];
                if artifact.required {
                    required_failures.push(failure);
                } else {
                    report
                        .warnings
                        .push(format!("{}: {}", artifact.name, failure.error));
                }
            }
        }

        for (artifact, slot) in artifacts.iter().zip(sources_used) {
            let source = slot.into_inner().ok().flatten();
            if let Some(source) = source {
                report.synced.push((artifact.name.clone(), source));
            }
        }

        if required_failures.is_empty() {
            Ok(report)
        } else {
            Err(RolloutError::Sync(AggregateSyncError::new(
                required_failures,
                artifacts.len(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FixedSource {
        name: &'static str,
        holds: HashSet<String>,
    }

    impl FixedSource {
        fn new(name: &'static str, holds: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                holds: holds.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    impl ArtifactSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn location(&self) -> &str {
            self.name
        }

        fn contains(&self, artifact: &Artifact) -> Result<bool> {
            Ok(self.holds.contains(&artifact.name))
        }
    }

    #[derive(Default)]
    struct RecordingCopier {
        copies: Mutex<Vec<(String, String)>>,
    }

    impl ArtifactCopier for RecordingCopier {
        fn copy(
            &self,
            artifact: &Artifact,
            source: &dyn ArtifactSource,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            self.copies
                .lock()
                .unwrap()
                .push((artifact.name.clone(), source.name().to_string()));
            Ok(())
        }
    }

    #[test]
    fn reference_splits_tag() {
        let artifact = Artifact::required("platform/api:1.4.2");
        assert_eq!(artifact.reference(), ("platform/api", "1.4.2"));
    }

    #[test]
    fn reference_defaults_to_latest() {
        let artifact = Artifact::required("platform/api");
        assert_eq!(artifact.reference(), ("platform/api", "latest"));
    }

    #[test]
    fn reference_ignores_port_in_host_segment() {
        let artifact = Artifact::required("localhost:5000/platform/api");
        assert_eq!(artifact.reference(), ("localhost:5000/platform/api", "latest"));
    }

    #[test]
    fn reference_keeps_digest() {
        let artifact = Artifact::required("platform/api@sha256:abc");
        assert_eq!(artifact.reference(), ("platform/api", "sha256:abc"));
    }

    #[test]
    fn falls_back_to_secondary_source() {
        let copier = Arc::new(RecordingCopier::default());
        let sync = ArtifactSynchronizer::new(copier.clone())
            .with_source(FixedSource::new("vendor", &["a:1"]))
            .with_source(FixedSource::new("client", &["b:1"]));

        let report = sync
            .sync_all(
                &[Artifact::required("a:1"), Artifact::required("b:1")],
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(
            report.synced,
            vec![
                ("a:1".to_string(), "vendor".to_string()),
                ("b:1".to_string(), "client".to_string())
            ]
        );
        assert_eq!(copier.copies.lock().unwrap().len(), 2);
    }

    #[test]
    fn missing_required_artifact_fails_sync() {
        let copier = Arc::new(RecordingCopier::default());
        let sync = ArtifactSynchronizer::new(copier)
            .with_source(FixedSource::new("vendor", &["a:1"]))
            .with_source(FixedSource::new("client", &[]));

        let err = sync
            .sync_all(
                &[Artifact::required("a:1"), Artifact::required("gone:1")],
                &CancellationToken::new(),
            )
            .unwrap_err();

        match err {
            RolloutError::Sync(aggregate) => {
                assert_eq!(aggregate.len(), 1);
                assert_eq!(aggregate.failures()[0].index, 1);
                let msg = aggregate.failures()[0].error.to_string();
                assert!(msg.contains("vendor or client"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_optional_artifact_is_a_warning() {
        let copier = Arc::new(RecordingCopier::default());
        let sync = ArtifactSynchronizer::new(copier)
            .with_source(FixedSource::new("vendor", &["a:1"]));

        let report = sync
            .sync_all(
                &[Artifact::required("a:1"), Artifact::optional("extra:1")],
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(report.synced.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("extra:1"));
    }

    #[test]
    fn cancelled_token_fails_every_task() {
        let copier = Arc::new(RecordingCopier::default());
        let sync = ArtifactSynchronizer::new(copier.clone())
            .with_source(FixedSource::new("vendor", &["a:1", "b:1"]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = sync
            .sync_all(&[Artifact::required("a:1"), Artifact::required("b:1")], &cancel)
            .unwrap_err();

        assert!(matches!(err, RolloutError::Sync(ref a) if a.len() == 2));
        assert!(copier.copies.lock().unwrap().is_empty());
    }
}
