//! Persistent installation state.
//!
//! The state file is JSON, rewritten atomically after every step
//! transition so an interrupted run can be resumed from the last
//! completed step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::error::{Result, RolloutError};

/// Default state file name, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = ".rollout-state.json";

/// Status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Short lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Persisted state of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub name: String,

    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Times the step was restarted after a failure.
    #[serde(default)]
    pub retries: u32,

    /// Fingerprint recorded when the step last started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl StepState {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Pending,
            start_time: None,
            end_time: None,
            error: None,
            retries: 0,
            fingerprint: None,
        }
    }

    /// Wall-clock duration, if the step has started and ended.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.end_time? - self.start_time?)
    }
}

/// Contents of the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallState {
    /// Schema version for migration.
    #[serde(default = "current_version")]
    pub version: u32,

    /// Id of the workspace and workflow this state belongs to.
    pub run_id: String,

    /// Step states in first-seen order.
    #[serde(default)]
    pub steps: Vec<StepState>,

    pub start_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    pub status: RunStatus,

    /// Whether the run was started with resume.
    #[serde(default)]
    pub resume: bool,
}

fn current_version() -> u32 {
    InstallState::CURRENT_VERSION
}

impl InstallState {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Fresh state for a new run.
    pub fn new(run_id: impl Into<String>, resume: bool) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            run_id: run_id.into(),
            steps: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            status: RunStatus::Running,
            resume,
        }
    }

    /// Load state from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| RolloutError::StateParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load state if the file exists.
    pub fn load_if_exists(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Save state to disk using atomic write.
    ///
    /// Writes to a sibling temp file and renames it over the target, so the
    /// state file is never partially written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|e| {
            RolloutError::Other(anyhow::anyhow!("Failed to serialize state: {}", e))
        })?;

        let mut temp_path = path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Get state for a step.
    pub fn step(&self, name: &str) -> Option<&StepState> {
        self.steps.iter().find(|s| s.name == name)
    }

    fn step_entry(&mut self, name: &str) -> &mut StepState {
        let index = match self.steps.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.steps.push(StepState::pending(name));
                self.steps.len() - 1
            }
        };
        &mut self.steps[index]
    }

    /// Whether `name` is recorded as completed.
    pub fn is_completed(&self, name: &str) -> bool {
        self.step(name)
            .is_some_and(|s| s.status == StepStatus::Completed)
    }

    /// Number of steps in each status.
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Thread-safe handle to the state file.
///
/// Every mutation is applied under a lock and flushed before the lock is
/// released, so concurrent steps never interleave partial writes.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: Mutex<InstallState>,
}

impl StateStore {
    /// Open the store for a run.
    ///
    /// With `resume`, existing state at `path` is loaded and must belong to
    /// `run_id`. Otherwise (or if there is nothing to resume) the store starts
    /// empty. Nothing is written until the first [`register`](Self::register)
    /// or transition, so a run rejected during planning leaves the file as it
    /// was.
    pub fn open(path: impl Into<PathBuf>, run_id: &str, resume: bool) -> Result<Self> {
        let path = path.into();

        let state = if resume {
            match InstallState::load_if_exists(&path)? {
                Some(mut state) => {
                    if state.run_id != run_id {
                        return Err(RolloutError::StateRunMismatch {
                            expected: run_id.to_string(),
                            found: state.run_id,
                        });
                    }
                    debug!(path = %path.display(), "Resuming from saved state");
                    state.resume = true;
                    state.status = RunStatus::Running;
                    state.start_time = Utc::now();
                    state.end_time = None;
                    state
                }
                None => {
                    warn!(
                        "No saved state at {}; starting a fresh run",
                        path.display()
                    );
                    InstallState::new(run_id, true)
                }
            }
        } else {
            InstallState::new(run_id, false)
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get the state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> InstallState {
        self.lock().clone()
    }

    /// Whether `name` is recorded as completed.
    pub fn is_completed(&self, name: &str) -> bool {
        self.lock().is_completed(name)
    }

    /// Add pending entries for steps not yet recorded.
    pub fn register<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let mut state = self.lock();
        for name in names {
            state.step_entry(name);
        }
        state.save(&self.path)
    }

    /// Check that every completed step was recorded with its current fingerprint.
    pub fn verify_fingerprints<'a>(
        &self,
        steps: impl IntoIterator<Item = (&'a str, String)>,
    ) -> Result<()> {
        let state = self.lock();
        for (name, current) in steps {
            let Some(recorded) = state.step(name) else {
                continue;
            };
            if recorded.status != StepStatus::Completed {
                continue;
            }
            match &recorded.fingerprint {
                Some(fp) if *fp == current => {}
                other => {
                    return Err(RolloutError::StateFingerprintMismatch {
                        step: name.to_string(),
                        recorded: other.clone().unwrap_or_else(|| "none".to_string()),
                        current,
                    });
                }
            }
        }
        Ok(())
    }

    /// Record that a step started.
    ///
    /// Restarting a step that previously failed counts as a retry.
    pub fn mark_running(&self, name: &str, fingerprint: &str) -> Result<()> {
        self.update(name, |step| {
            if step.status == StepStatus::Failed {
                step.retries += 1;
            }
            step.status = StepStatus::Running;
            step.start_time = Some(Utc::now());
            step.end_time = None;
            step.error = None;
            step.fingerprint = Some(fingerprint.to_string());
        })
    }

    pub fn mark_completed(&self, name: &str) -> Result<()> {
        self.update(name, |step| {
            step.status = StepStatus::Completed;
            step.end_time = Some(Utc::now());
            step.error = None;
        })
    }

    pub fn mark_failed(&self, name: &str, error: &str) -> Result<()> {
        self.update(name, |step| {
            step.status = StepStatus::Failed;
            step.end_time = Some(Utc::now());
            step.error = Some(error.to_string());
        })
    }

    pub fn mark_skipped(&self, name: &str) -> Result<()> {
        self.update(name, |step| {
            step.status = StepStatus::Skipped;
            step.end_time = Some(Utc::now());
        })
    }

    /// Reset a compensated step so a later resume runs it again.
    pub fn mark_rolled_back(&self, name: &str) -> Result<()> {
        self.update(name, |step| {
            step.status = StepStatus::Pending;
            step.end_time = Some(Utc::now());
            step.error = Some("rolled back".to_string());
        })
    }

    /// Record the final run status.
    pub fn finish(&self, status: RunStatus) -> Result<()> {
        let mut state = self.lock();
        state.status = status;
        state.end_time = Some(Utc::now());
        state.save(&self.path)
    }

    /// Delete the state file at `path`. Returns whether a file was removed.
    pub fn clear(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, name: &str, apply: impl FnOnce(&mut StepState)) -> Result<()> {
        let mut state = self.lock();
        apply(state.step_entry(name));
        state.save(&self.path)
    }

    fn lock(&self) -> MutexGuard<'_, InstallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state_path(temp: &TempDir) -> PathBuf {
        temp.path().join("state").join("rollout.json")
    }

    #[test]
    fn open_defers_write_until_register() {
        let temp = TempDir::new().unwrap();
        let path = state_path(&temp);
        let store = StateStore::open(&path, "abc", false).unwrap();
        assert!(!path.exists());

        store.register(std::iter::empty::<&str>()).unwrap();
        let state = InstallState::load(&path).unwrap();
        assert_eq!(state.run_id, "abc");
        assert_eq!(state.status, RunStatus::Running);
        assert!(state.steps.is_empty());
        assert!(!state.resume);
    }

    #[test]
    fn json_uses_camel_case_and_lowercase_status() {
        let temp = TempDir::new().unwrap();
        let path = state_path(&temp);
        let store = StateStore::open(&path, "abc", false).unwrap();
        store.mark_running("setup", "ff00").unwrap();
        store.mark_completed("setup").unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"runId\""));
        assert!(raw.contains("\"startTime\""));
        assert!(raw.contains("\"status\": \"completed\""));
        assert!(!temp.path().join("state").join("rollout.json.tmp").exists());
    }

    #[test]
    fn transitions_are_persisted_immediately() {
        let temp = TempDir::new().unwrap();
        let path = state_path(&temp);
        let store = StateStore::open(&path, "abc", false).unwrap();

        store.mark_running("deploy", "ff00").unwrap();
        let on_disk = InstallState::load(&path).unwrap();
        assert_eq!(on_disk.step("deploy").unwrap().status, StepStatus::Running);

        store.mark_failed("deploy", "helm timed out").unwrap();
        let on_disk = InstallState::load(&path).unwrap();
        let step = on_disk.step("deploy").unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("helm timed out"));
        assert!(step.end_time.is_some());
    }

    #[test]
    fn restart_after_failure_counts_retry() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(state_path(&temp), "abc", false).unwrap();

        store.mark_running("deploy", "ff00").unwrap();
        assert_eq!(store.snapshot().step("deploy").unwrap().retries, 0);
        store.mark_failed("deploy", "boom").unwrap();
        store.mark_running("deploy", "ff00").unwrap();

        let state = store.snapshot();
        let step = state.step("deploy").unwrap();
        assert_eq!(step.retries, 1);
        assert!(step.error.is_none());
    }

    #[test]
    fn resume_loads_previous_state() {
        let temp = TempDir::new().unwrap();
        let path = state_path(&temp);
        {
            let store = StateStore::open(&path, "abc", false).unwrap();
            store.mark_running("setup", "ff00").unwrap();
            store.mark_completed("setup").unwrap();
            store.finish(RunStatus::Failed).unwrap();
        }

        let store = StateStore::open(&path, "abc", true).unwrap();
        let state = store.snapshot();
        assert!(state.resume);
        assert_eq!(state.status, RunStatus::Running);
        assert!(state.end_time.is_none());
        assert!(store.is_completed("setup"));
    }

    #[test]
    fn resume_rejects_foreign_state() {
        let temp = TempDir::new().unwrap();
        let path = state_path(&temp);
        StateStore::open(&path, "abc", false)
            .unwrap()
            .register(["setup"])
            .unwrap();

        let err = StateStore::open(&path, "def", true).unwrap_err();
        assert!(matches!(err, RolloutError::StateRunMismatch { .. }));
    }

    #[test]
    fn resume_without_state_starts_fresh() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(state_path(&temp), "abc", true).unwrap();
        assert!(store.snapshot().steps.is_empty());
    }

    #[test]
    fn fresh_open_discards_previous_state() {
        let temp = TempDir::new().unwrap();
        let path = state_path(&temp);
        {
            let store = StateStore::open(&path, "abc", false).unwrap();
            store.mark_completed("setup").unwrap();
        }
        let store = StateStore::open(&path, "abc", false).unwrap();
        assert!(!store.is_completed("setup"));
    }

    #[test]
    fn corrupt_state_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = state_path(&temp);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = StateStore::open(&path, "abc", true).unwrap_err();
        assert!(matches!(err, RolloutError::StateParseError { .. }));
    }

    #[test]
    fn fingerprint_mismatch_is_reported() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(state_path(&temp), "abc", false).unwrap();
        store.mark_running("deploy", "aaaa").unwrap();
        store.mark_completed("deploy").unwrap();

        assert!(store
            .verify_fingerprints([("deploy", "aaaa".to_string())])
            .is_ok());
        let err = store
            .verify_fingerprints([("deploy", "bbbb".to_string())])
            .unwrap_err();
        assert!(matches!(
            err,
            RolloutError::StateFingerprintMismatch { ref recorded, ref current, .. }
                if recorded == "aaaa" && current == "bbbb"
        ));
    }

    #[test]
    fn reopening_leaves_previous_file_untouched() {
        let temp = TempDir::new().unwrap();
        let path = state_path(&temp);
        {
            let store = StateStore::open(&path, "abc", false).unwrap();
            store.mark_running("setup", "aaaa").unwrap();
            store.mark_completed("setup").unwrap();
            store.finish(RunStatus::Completed).unwrap();
        }
        let before = fs::read(&path).unwrap();

        let resumed = StateStore::open(&path, "abc", true).unwrap();
        assert!(resumed
            .verify_fingerprints([("setup", "bbbb".to_string())])
            .is_err());
        StateStore::open(&path, "abc", false).unwrap();

        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn unfinished_steps_skip_fingerprint_check() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(state_path(&temp), "abc", false).unwrap();
        store.mark_running("deploy", "aaaa").unwrap();
        store.mark_failed("deploy", "boom").unwrap();

        assert!(store
            .verify_fingerprints([("deploy", "bbbb".to_string()), ("other", "cccc".to_string())])
            .is_ok());
    }

    #[test]
    fn register_adds_pending_steps_once() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(state_path(&temp), "abc", false).unwrap();
        store.mark_completed("setup").unwrap();
        store.register(["setup", "deploy"]).unwrap();

        let state = store.snapshot();
        assert_eq!(state.steps.len(), 2);
        assert_eq!(state.step("setup").unwrap().status, StepStatus::Completed);
        assert_eq!(state.step("deploy").unwrap().status, StepStatus::Pending);
    }

    #[test]
    fn clear_removes_file() {
        let temp = TempDir::new().unwrap();
        let path = state_path(&temp);
        StateStore::open(&path, "abc", false)
            .unwrap()
            .register(["setup"])
            .unwrap();

        assert!(StateStore::clear(&path).unwrap());
        assert!(!path.exists());
        assert!(!StateStore::clear(&path).unwrap());
    }
}
