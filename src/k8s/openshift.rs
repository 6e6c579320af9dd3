//! OpenShift platform resources read during environment discovery

use kube::api::ListParams;
use kube::{Api, Client, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::wait::{
    ClusterConditionSource, ConditionStatus, ExpectedCondition, HasConditions, StatusCondition,
    WaitError,
    wait_for_condition,
};

/// Name of the singleton ClusterVersion object
pub const CLUSTER_VERSION_NAME: &str = "version";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "ClusterVersion",
    plural = "clusterversions",
    status = "ClusterVersionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, rename = "clusterID", skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterVersionStatus {
    #[serde(default)]
    pub desired: Release,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<UpdateHistory>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Release {
    #[serde(default)]
    pub version: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct UpdateHistory {
    /// `Completed` or `Partial`
    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub version: String,
}

impl ClusterVersion {
    /// Version of the last completed update, falling back to the desired version
    pub fn current_version(&self) -> String {
        let Some(status) = &self.status else {
            return String::new();
        };

        if let Some(completed) = status.history.iter().rev().find(|h| h.state == "Completed") {
            return completed.version.clone();
        }

        tracing::warn!("No completed version found in clusterversion. Returning desired version");
        status.desired.version.clone()
    }
}

/// OLM ClusterServiceVersion, only what is needed to read operator versions
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "ClusterServiceVersion",
    plural = "clusterserviceversions",
    shortname = "csv",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionSpec {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub display_name: String,
}

/// Machine config pool of the control plane, which also holds the only node of an SNO
pub const MASTER_MCP_NAME: &str = "master";

/// MachineConfigPool, read for its rollout conditions
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    plural = "machineconfigpools",
    shortname = "mcp",
    status = "MachineConfigPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    #[serde(default)]
    pub paused: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    #[serde(default)]
    pub machine_count: u32,

    #[serde(default)]
    pub updated_machine_count: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,
}

impl HasConditions for MachineConfigPool {
    fn conditions(&self) -> &[StatusCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

/// Wait for a machine config rollout on `pool` to start and then to finish.
///
/// Only call this after a change that is known to render a new machine config.
pub async fn wait_for_mcp_update(
    client: Client,
    pool: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<(), WaitError> {
    let source = ClusterConditionSource::<MachineConfigPool>::new(client);

    let updating = ExpectedCondition::new("Updating").with_status(ConditionStatus::True);
    wait_for_condition(&source, pool, "", &updating, interval, timeout).await?;

    let updated = ExpectedCondition::new("Updated").with_status(ConditionStatus::True);
    wait_for_condition(&source, pool, "", &updated, interval, timeout).await
}

pub async fn get_cluster_version(client: Client) -> Result<String, kube::Error> {
    let api: Api<ClusterVersion> = Api::all(client);
    Ok(api.get(CLUSTER_VERSION_NAME).await?.current_version())
}

/// Unique cluster ID recorded in the ClusterVersion spec, empty when unset
pub async fn get_cluster_id(client: Client) -> Result<String, kube::Error> {
    let api: Api<ClusterVersion> = Api::all(client);
    Ok(api.get(CLUSTER_VERSION_NAME).await?.spec.cluster_id.unwrap_or_default())
}

/// Names of every CSV on the cluster, sorted and without duplicates.
///
/// Copied CSVs show up once per namespace, hence the dedup.
pub async fn list_csv_names(client: Client) -> Result<Vec<String>, kube::Error> {
    let api: Api<ClusterServiceVersion> = Api::all(client);
    let mut names: Vec<String> = api
        .list(&ListParams::default())
        .await?
        .items
        .into_iter()
        .filter_map(|csv| csv.metadata.name)
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

/// Version of the first CSV in `namespace` whose name contains `operator_name`.
///
/// An operator that is not installed gives an empty version.
pub async fn get_operator_version_from_csv(
    client: Client,
    operator_name: &str,
    namespace: &str,
) -> Result<String, kube::Error> {
    let api: Api<ClusterServiceVersion> = Api::namespaced(client, namespace);
    let csvs = api.list(&ListParams::default()).await?;
    Ok(operator_version(&csvs.items, operator_name))
}

fn operator_version(csvs: &[ClusterServiceVersion], operator_name: &str) -> String {
    csvs.iter()
        .find(|csv| {
            csv.metadata
                .name
                .as_deref()
                .is_some_and(|name| name.contains(operator_name))
        })
        .map(|csv| csv.spec.version.clone())
        .unwrap_or_default()
}
