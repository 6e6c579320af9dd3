//! Creating ClusterGroupUpgrades and waiting on their progress

use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::json;
use std::time::Duration;

use super::TalmError;
use super::crd::{ClusterGroupUpgrade, ClusterGroupUpgradeSpec, RemediationStrategy};
use super::vocabulary::ConditionVocabulary;
use crate::wait::{
    ExpectedCondition, FetchError, KubeConditionSource, Mismatch, PollOutcome, WaitError,
    poll_until,
    wait_for_condition, wait_until_exists,
};

pub const TALM_TEST_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const CLUSTER_PROGRESS_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const OBJECT_EXISTS_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const OBJECT_EXISTS_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Enforce policy names are generated from the CGU and policy names and must stay
/// below the 63 character limit, with room for a suffix.
const POLICY_NAME_WARN_LENGTH: usize = 50;

/// Define a CGU that starts remediating as soon as it is created
pub fn cgu_definition(
    name: &str,
    namespace: &str,
    clusters: Vec<String>,
    canaries: Vec<String>,
    managed_policies: Vec<String>,
    max_concurrency: u32,
    timeout_minutes: u32,
) -> ClusterGroupUpgrade {
    let mut cgu = ClusterGroupUpgrade::new(
        name,
        ClusterGroupUpgradeSpec {
            clusters,
            managed_policies,
            enable: Some(true),
            backup: false,
            pre_caching: false,
            remediation_strategy: Some(RemediationStrategy {
                max_concurrency,
                timeout: timeout_minutes,
                canaries,
            }),
        },
    );
    cgu.metadata.namespace = Some(namespace.to_string());
    cgu
}

/// Reject CGUs TALM would refuse or choke on
pub fn validate_cgu(cgu: &ClusterGroupUpgrade) -> Result<(), TalmError> {
    let name = cgu.metadata.name.as_deref().unwrap_or_default();

    if cgu.spec.clusters.iter().any(String::is_empty) {
        return Err(TalmError::EmptyCluster);
    }

    for policy in &cgu.spec.managed_policies {
        if policy.is_empty() {
            return Err(TalmError::EmptyPolicy);
        }
        if policy.len() + name.len() > POLICY_NAME_WARN_LENGTH {
            crate::log_warn!(
                "Length of generated TALM policies for {} may exceed character limit and not work",
                policy
            );
        }
    }

    if name.is_empty() {
        return Err(TalmError::EmptyName);
    }

    Ok(())
}

/// TALM operations against one hub cluster
#[derive(Clone)]
pub struct Talm {
    client: Client,
    vocabulary: &'static ConditionVocabulary,
    poll_interval: Duration,
}

impl Talm {
    /// `version` is the TALM version on the hub, used to pick condition names
    pub fn new(client: Client, version: &str) -> Result<Self, TalmError> {
        Ok(Self {
            client,
            vocabulary: ConditionVocabulary::for_talm_version(version)?,
            poll_interval: TALM_TEST_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn vocabulary(&self) -> &'static ConditionVocabulary {
        self.vocabulary
    }

    fn api(&self, namespace: &str) -> Api<ClusterGroupUpgrade> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub async fn wait_for_cgu_in_condition(
        &self,
        name: &str,
        namespace: &str,
        expected: &ExpectedCondition,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        let source = KubeConditionSource::<ClusterGroupUpgrade>::new(self.client.clone());
        wait_for_condition(&source, name, namespace, expected, self.poll_interval, timeout).await
    }

    /// Wait for the completion condition of this TALM version
    pub async fn wait_for_cgu_to_finish_successfully(
        &self,
        name: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        tracing::debug!(name, namespace, "waiting for CGU to finish successfully");
        self.wait_for_cgu_in_condition(name, namespace, &self.vocabulary.completed(), timeout)
            .await
    }

    pub async fn is_cluster_started_in_cgu(
        &self,
        name: &str,
        cluster: &str,
        namespace: &str,
    ) -> Result<bool, TalmError> {
        let cgu = self.api(namespace).get(name).await?;
        Ok(cgu.is_cluster_started(cluster))
    }

    pub async fn is_cluster_in_progress_in_cgu(
        &self,
        name: &str,
        cluster: &str,
        namespace: &str,
    ) -> Result<bool, TalmError> {
        let cgu = self.api(namespace).get(name).await?;
        Ok(cgu.is_cluster_in_progress(cluster))
    }

    /// Wait until `cluster` is actively being remediated. Errors other than missing
    /// objects and transient API failures end the wait.
    pub async fn wait_for_cluster_in_progress_in_cgu(
        &self,
        name: &str,
        cluster: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        crate::log_info!("Waiting until cluster '{}' in progress in cgu '{}'", cluster, name);

        let api = &self.api(namespace);
        let resource = format!("clustergroupupgrade {}/{}", namespace, name);

        poll_until(&resource, CLUSTER_PROGRESS_POLL_INTERVAL, timeout, move || async move {
            match api.get(name).await {
                Ok(cgu) if cgu.is_cluster_in_progress(cluster) => PollOutcome::Satisfied,
                Ok(cgu) => PollOutcome::Pending(Mismatch::Other(format!(
                    "cluster '{}' state is '{}'",
                    cluster,
                    cgu.cluster_state(cluster).unwrap_or("unknown")
                ))),
                Err(e) => PollOutcome::from_fetch_error(FetchError::from_kube(&e)),
            }
        })
        .await
    }

    /// Validate, create, and wait until the CGU can be read back
    pub async fn create_cgu_and_wait(&self, cgu: &ClusterGroupUpgrade) -> Result<(), TalmError> {
        validate_cgu(cgu)?;

        let name = cgu.metadata.name.as_deref().unwrap_or_default();
        let namespace = cgu.metadata.namespace.as_deref().unwrap_or("default");
        let api = &self.api(namespace);

        api.create(&PostParams::default(), cgu).await?;
        crate::log_info!("Created cgu {}/{}", namespace, name);

        let resource = format!("clustergroupupgrade {}/{}", namespace, name);
        wait_until_exists(
            &resource,
            OBJECT_EXISTS_POLL_INTERVAL,
            OBJECT_EXISTS_TIMEOUT,
            move || is_cgu_exist(api, name),
        )
        .await?;

        Ok(())
    }

    /// Set `spec.enable` on an existing CGU
    pub async fn enable_cgu(&self, name: &str, namespace: &str) -> Result<(), TalmError> {
        let patch = json!({ "spec": { "enable": true } });
        self.api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    /// Delete the CGU; a CGU that is already gone is fine
    pub async fn cleanup_cgu(&self, name: &str, namespace: &str) -> Result<(), TalmError> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                crate::log_info!("Deleted cgu {}/{}", namespace, name);
                Ok(())
            }
            Err(e) if is_missing(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether the CGU exists; missing kinds and objects both count as "no"
pub async fn is_cgu_exist(api: &Api<ClusterGroupUpgrade>, name: &str) -> Result<bool, kube::Error> {
    tracing::debug!(name, "checking for existence of cgu");
    match api.get(name).await {
        Ok(_) => Ok(true),
        Err(e) if is_missing(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_missing(err: &kube::Error) -> bool {
    matches!(FetchError::from_kube(err), FetchError::Missing(_))
}
