//! Infrastructure provisioning backends.

pub mod strategy;

pub use strategy::{MakefileBackend, ProvisionAction, ProvisionStrategy, TerraformBackend};
