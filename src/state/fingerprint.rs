//! Step fingerprints.
//!
//! A fingerprint is recorded with every step that starts. On resume, a
//! completed step whose fingerprint no longer matches was produced under a
//! different configuration and cannot be trusted.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hash a step's name, dependency set and configuration inputs.
///
/// Dependency order does not matter. Returns 16 hex characters.
pub fn fingerprint(name: &str, dependencies: &[String], config: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);

    let mut deps: Vec<&str> = dependencies.iter().map(String::as_str).collect();
    deps.sort_unstable();
    deps.dedup();
    for dep in deps {
        hasher.update(dep.as_bytes());
        hasher.update([0u8]);
    }

    hasher.update([1u8]);
    for (key, value) in config {
        hasher.update(key.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }

    let result = hasher.finalize();
    hex::encode(&result[..8])
}
