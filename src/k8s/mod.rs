//! Kubernetes operations

pub mod environment;
pub mod kubectl;
#[cfg(test)]
pub(crate) mod mock;
pub mod nodes;
pub mod openshift;

pub use environment::{ClusterEnvironment, ClusterHandle, EnvironmentError};
pub use kubectl::{CommandError, CommandRunner, KubectlRunner};
