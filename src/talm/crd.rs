//! ClusterGroupUpgrade custom resource

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::wait::{HasConditions, StatusCondition};

/// Remediation state of a cluster that has not been touched yet
pub const STATE_NOT_STARTED: &str = "NotStarted";

/// Remediation state of a cluster being actively remediated
pub const STATE_IN_PROGRESS: &str = "InProgress";

/// Specification for a ClusterGroupUpgrade
///
/// Rolls a set of managed policies out to a list of clusters in batches, optionally
/// starting with canary clusters.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ran.openshift.io",
    version = "v1alpha1",
    kind = "ClusterGroupUpgrade",
    plural = "clustergroupupgrades",
    shortname = "cgu",
    status = "ClusterGroupUpgradeStatus",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGroupUpgradeSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_policies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,

    #[serde(default)]
    pub backup: bool,

    #[serde(default)]
    pub pre_caching: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_strategy: Option<RemediationStrategy>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemediationStrategy {
    pub max_concurrency: u32,

    /// Minutes
    #[serde(default)]
    pub timeout: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub canaries: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGroupUpgradeStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UpgradeStatus>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_batch: Option<u32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub current_batch_remediation_progress: BTreeMap<String, ClusterRemediationProgress>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRemediationProgress {
    #[serde(default)]
    pub state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_index: Option<u32>,
}

impl HasConditions for ClusterGroupUpgrade {
    fn conditions(&self) -> &[StatusCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

impl ClusterGroupUpgrade {
    /// Remediation state of `cluster` in the current batch
    pub fn cluster_state(&self, cluster: &str) -> Option<&str> {
        self.status
            .as_ref()?
            .status
            .as_ref()?
            .current_batch_remediation_progress
            .get(cluster)
            .map(|progress| progress.state.as_str())
    }

    /// True once remediation of `cluster` has left `NotStarted`
    pub fn is_cluster_started(&self, cluster: &str) -> bool {
        self.cluster_state(cluster)
            .is_some_and(|state| state != STATE_NOT_STARTED)
    }

    pub fn is_cluster_in_progress(&self, cluster: &str) -> bool {
        self.cluster_state(cluster) == Some(STATE_IN_PROGRESS)
    }
}
