//! Bounded-concurrency artifact synchronization.
//!
//! The pool in [`pool`] is generic over its payload; the scheduler reuses it
//! to run the steps of a parallel level under the same worker cap.

pub mod artifact;
pub mod copier;
pub mod pool;
pub mod registry;

pub use artifact::{Artifact, ArtifactCopier, ArtifactSource, ArtifactSynchronizer, SyncReport};
pub use copier::{CommandCopier, DEFAULT_COPY_COMMAND};
pub use pool::{run_all, AggregateSyncError, SyncFailure, SyncOutcome, SyncTask, DEFAULT_SYNC_LIMIT};
pub use registry::{AuthHeader, RegistrySource};
