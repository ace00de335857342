//! Run identification.
//!
//! A run id ties a state file to the workspace and workflow that produced
//! it, so `--resume` never picks up state written by a different install.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Stable identifier of a workflow in a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId {
    /// 16 hex characters (8 bytes of SHA256).
    hash: String,
    /// Absolute workspace path.
    workspace: PathBuf,
}

impl RunId {
    /// Derive the id for `workflow` running in `workspace`.
    ///
    /// The workspace does not need to exist yet; existing paths are
    /// canonicalized so symlinked spellings agree.
    pub fn new(workspace: &Path, workflow: &str) -> Result<Self> {
        let workspace = match workspace.canonicalize() {
            Ok(path) => path,
            Err(_) => std::path::absolute(workspace)?,
        };
        let hash = Self::compute_hash(&workspace, workflow);
        Ok(Self { hash, workspace })
    }

    /// Get the hash as a string.
    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// Get the workspace path.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn compute_hash(workspace: &Path, workflow: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(workspace.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(workflow.as_bytes());

        let result = hasher.finalize();
        hex::encode(&result[..8])
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}
