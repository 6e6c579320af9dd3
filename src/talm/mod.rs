//! Topology Aware Lifecycle Manager helpers

pub mod cgu;
pub mod crd;
pub mod vocabulary;

use thiserror::Error;

use crate::version::VersionError;
use crate::wait::WaitError;

pub use cgu::{Talm, cgu_definition, is_cgu_exist, validate_cgu};
pub use crd::{ClusterGroupUpgrade, ClusterGroupUpgradeSpec, RemediationStrategy};
pub use vocabulary::{ConditionVocabulary, TALM_UPDATED_CONDITIONS_VERSION};

/// Namespace the TALM suites create their CGUs in
pub const TALM_TEST_NAMESPACE: &str = "talm-test";

#[derive(Error, Debug)]
pub enum TalmError {
    #[error("provided empty cguName")]
    EmptyName,

    #[error("provided empty cluster in clustersList")]
    EmptyCluster,

    #[error("provided empty policy in managedPolicies")]
    EmptyPolicy,

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error(transparent)]
    Version(#[from] VersionError),
}
