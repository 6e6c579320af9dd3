//! Image based upgrade helpers for single node clusters

pub mod cluster_info;
pub mod crd;
pub mod upgrade;

use thiserror::Error;

use crate::wait::WaitError;

pub use cluster_info::{ClusterInfo, validate_upgrade};
pub use crd::{IbuStage, ImageBasedUpgrade, ImageBasedUpgradeSpec, SeedImageRef};
pub use upgrade::Ibu;

/// Name of the singleton ImageBasedUpgrade object
pub const IBU_CR_NAME: &str = "upgrade";

/// Namespace the lifecycle agent runs in
pub const LIFECYCLE_AGENT_NAMESPACE: &str = "openshift-lifecycle-agent";

#[derive(Error, Debug)]
pub enum IbuError {
    #[error("unknown image based upgrade stage '{0}', expected Idle, Prep, Upgrade or Rollback")]
    UnknownStage(String),

    #[error("image based upgrade cannot move from {from} to {to}")]
    InvalidTransition { from: IbuStage, to: IbuStage },

    #[error("cluster has no nodes")]
    NoNodes,

    #[error("upgrade validation failed:\n  {}", .0.join("\n  "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Wait(#[from] WaitError),
}
