//! Cluster facts captured before and after an upgrade, and the checks between them

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::ListParams;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};

use super::IbuError;
use crate::k8s::openshift::{get_cluster_id, get_cluster_version, list_csv_names};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub version: String,
    pub id: String,
    /// Names of the installed CSVs
    pub operators: Vec<String>,
    pub node_name: String,
}

impl ClusterInfo {
    /// Snapshot the cluster the client points at
    pub async fn collect(client: Client) -> Result<Self, IbuError> {
        let version = get_cluster_version(client.clone()).await?;
        let id = get_cluster_id(client.clone()).await?;
        let operators = list_csv_names(client.clone()).await?;

        let nodes: Api<Node> = Api::all(client);
        let node_name = nodes
            .list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .next()
            .and_then(|node| node.metadata.name)
            .ok_or(IbuError::NoNodes)?;

        tracing::debug!(
            %version,
            %id,
            operators = operators.len(),
            %node_name,
            "collected cluster info"
        );
        Ok(Self {
            version,
            id,
            operators,
            node_name,
        })
    }
}

/// Compare snapshots taken before and after an upgrade.
///
/// The version must change, the cluster ID must not, and no CSV may survive under its
/// old name. Every failed check is reported.
pub fn validate_upgrade(before: &ClusterInfo, after: &ClusterInfo) -> Result<(), IbuError> {
    let mut failures = Vec::new();

    if before.version == after.version {
        failures.push(format!("cluster version hasn't changed from {}", before.version));
    }

    if before.id != after.id {
        failures.push(format!("cluster ID has changed from {} to {}", before.id, after.id));
    }

    for operator in &before.operators {
        if after.operators.contains(operator) {
            failures.push(format!("operator {} was not upgraded", operator));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(IbuError::Validation(failures))
    }
}

/// Pods in any namespace whose name still carries `seed_node_name`
pub async fn pods_named_after(
    client: Client,
    seed_node_name: &str,
) -> Result<Vec<String>, IbuError> {
    let pods: Api<Pod> = Api::all(client);
    Ok(pods
        .list(&ListParams::default())
        .await?
        .items
        .into_iter()
        .filter_map(|pod| pod.metadata.name)
        .filter(|name| name.contains(seed_node_name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::mock::{Exchange, mock_client, serve};
    use http::Method;
    use serde_json::json;

    fn info(version: &str, id: &str, operators: &[&str]) -> ClusterInfo {
        ClusterInfo {
            version: version.to_string(),
            id: id.to_string(),
            operators: operators.iter().map(|o| o.to_string()).collect(),
            node_name: "sno-target".to_string(),
        }
    }

    #[test]
    fn test_successful_upgrade_validates() {
        let before = info("4.14.12", "abc", &["lifecycle-agent.v4.14.0"]);
        let after = info("4.15.2", "abc", &["lifecycle-agent.v4.15.0"]);
        tokio_test::assert_ok!(validate_upgrade(&before, &after));
    }

    #[test]
    fn test_every_failure_is_reported() {
        let before = info("4.14.12", "abc", &["lifecycle-agent.v4.14.0", "packageserver"]);
        let after = info("4.14.12", "def", &["lifecycle-agent.v4.15.0", "packageserver"]);

        let Err(IbuError::Validation(failures)) = validate_upgrade(&before, &after) else {
            panic!("expected validation failures");
        };
        assert_eq!(
            failures,
            vec![
                "cluster version hasn't changed from 4.14.12",
                "cluster ID has changed from abc to def",
                "operator packageserver was not upgraded",
            ]
        );
    }

    #[test]
    fn test_snapshot_json_shape() {
        let value = serde_json::to_value(info("4.15.2", "abc", &[])).unwrap();
        assert_eq!(value["nodeName"], "sno-target");
        let back: ClusterInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back.version, "4.15.2");
    }

    #[tokio::test]
    async fn test_collect() {
        let (client, handle) = mock_client();
        let server = serve(
            handle,
            vec![
                Exchange::ok(
                    Method::GET,
                    "/apis/config.openshift.io/v1/clusterversions/version",
                    json!({
                        "apiVersion": "config.openshift.io/v1",
                        "kind": "ClusterVersion",
                        "metadata": {"name": "version"},
                        "spec": {"clusterID": "abc"},
                        "status": {
                            "desired": {"version": "4.15.2"},
                            "history": [{"state": "Completed", "version": "4.15.2"}]
                        }
                    }),
                ),
                Exchange::ok(
                    Method::GET,
                    "/apis/config.openshift.io/v1/clusterversions/version",
                    json!({
                        "apiVersion": "config.openshift.io/v1",
                        "kind": "ClusterVersion",
                        "metadata": {"name": "version"},
                        "spec": {"clusterID": "abc"}
                    }),
                ),
                Exchange::ok(
                    Method::GET,
                    "/apis/operators.coreos.com/v1alpha1/clusterserviceversions",
                    json!({
                        "apiVersion": "operators.coreos.com/v1alpha1",
                        "kind": "ClusterServiceVersionList",
                        "metadata": {},
                        "items": [{
                            "apiVersion": "operators.coreos.com/v1alpha1",
                            "kind": "ClusterServiceVersion",
                            "metadata": {"name": "lifecycle-agent.v4.15.0", "namespace": "openshift-lifecycle-agent"},
                            "spec": {"version": "4.15.0", "displayName": "Lifecycle Agent"}
                        }]
                    }),
                ),
                Exchange::ok(
                    Method::GET,
                    "/api/v1/nodes",
                    json!({
                        "apiVersion": "v1",
                        "kind": "NodeList",
                        "metadata": {},
                        "items": [{"apiVersion": "v1", "kind": "Node", "metadata": {"name": "sno-target"}}]
                    }),
                ),
            ],
        );

        let collected = ClusterInfo::collect(client).await.unwrap();
        assert_eq!(collected, info("4.15.2", "abc", &["lifecycle-agent.v4.15.0"]));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_pods_named_after_seed() {
        let pod = |name: &str| {
            json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": name, "namespace": "openshift-etcd"}})
        };
        let (client, handle) = mock_client();
        let server = serve(
            handle,
            vec![Exchange::ok(
                Method::GET,
                "/api/v1/pods",
                json!({
                    "apiVersion": "v1",
                    "kind": "PodList",
                    "metadata": {},
                    "items": [pod("etcd-sno-seed"), pod("etcd-sno-target"), pod("installer-3-sno-target")]
                }),
            )],
        );

        assert_eq!(
            pods_named_after(client, "sno-seed").await.unwrap(),
            vec!["etcd-sno-seed"]
        );
        server.await.unwrap();
    }
}
