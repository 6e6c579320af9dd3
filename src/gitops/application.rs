//! Argo CD Applications driving ZTP

use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;

use super::GitopsError;
use super::paths::ztp_version_from_image;
use crate::wait::{FetchError, Mismatch, PollOutcome, WaitError, poll_until};

pub const OPENSHIFT_GITOPS_NAMESPACE: &str = "openshift-gitops";
pub const REPO_SERVER_DEPLOYMENT: &str = "openshift-gitops-repo-server";
pub const ARGOCD_CHANGE_INTERVAL: Duration = Duration::from_secs(10);
pub const ARGOCD_CHANGE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Argo CD Application, reduced to its git source and sync state
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Application",
    plural = "applications",
    status = "ApplicationStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    #[serde(default)]
    pub source: ApplicationSource,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    #[serde(default, rename = "repoURL")]
    pub repo_url: String,

    #[serde(default)]
    pub target_revision: String,

    #[serde(default)]
    pub path: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default)]
    pub sync: SyncStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ApplicationCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_state: Option<OperationState>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// `Synced`, `OutOfSync` or `Unknown`
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub compared_to: ComparedTo,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ComparedTo {
    #[serde(default)]
    pub source: ApplicationSource,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCondition {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_result: Option<SyncResult>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SyncResult {
    #[serde(default)]
    pub resources: Vec<ResourceResult>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceResult {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Where an Application reads its manifests from
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GitDetails {
    pub repo: String,
    pub branch: String,
    pub path: String,
}

impl From<&ApplicationSource> for GitDetails {
    fn from(source: &ApplicationSource) -> Self {
        Self {
            repo: source.repo_url.clone(),
            branch: source.target_revision.clone(),
            path: source.path.clone(),
        }
    }
}

impl fmt::Display for GitDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} : {}", self.repo, self.branch, self.path)
    }
}

impl Application {
    pub fn git_details(&self) -> GitDetails {
        GitDetails::from(&self.spec.source)
    }

    /// Whether the last sync used the current source, and synced cleanly if required
    pub fn change_status(&self, sync_must_be_valid: bool) -> Result<(), Mismatch> {
        let default_status = ApplicationStatus::default();
        let status = self.status.as_ref().unwrap_or(&default_status);

        if status.sync.compared_to.source != self.spec.source {
            return Err(Mismatch::Other(format!(
                "last sync compared against {}, expected {}",
                GitDetails::from(&status.sync.compared_to.source),
                self.git_details()
            )));
        }

        if sync_must_be_valid && status.sync.status != "Synced" {
            return Err(Mismatch::Other(format!(
                "sync status is '{}', expected 'Synced'",
                status.sync.status
            )));
        }

        Ok(())
    }

    fn log_diagnostics(&self) {
        let Some(status) = &self.status else {
            return;
        };

        for (index, condition) in status.conditions.iter().enumerate() {
            tracing::info!("Condition #{}: '{}: {}'", index, condition.type_, condition.message);
        }

        let resources = status
            .operation_state
            .as_ref()
            .and_then(|op| op.sync_result.as_ref())
            .map(|result| result.resources.as_slice())
            .unwrap_or_default();
        for (index, resource) in resources.iter().enumerate() {
            tracing::info!(
                "Sync resource #{}: '{} {}/{} {} {}'",
                index,
                resource.kind,
                resource.namespace,
                resource.name,
                resource.status,
                resource.message
            );
        }
    }
}

/// Argo CD operations against the hub's GitOps namespace
#[derive(Clone)]
pub struct ArgoCd {
    client: Client,
    namespace: String,
    interval: Duration,
}

impl ArgoCd {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            namespace: OPENSHIFT_GITOPS_NAMESPACE.to_string(),
            interval: ARGOCD_CHANGE_INTERVAL,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn api(&self) -> Api<Application> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub async fn get_git_details(&self, app: &str) -> Result<GitDetails, GitopsError> {
        Ok(self.api().get(app).await?.git_details())
    }

    /// Point `app` at new git details. Nothing happens when they are already set.
    pub async fn set_git_details(
        &self,
        app: &str,
        details: &GitDetails,
        wait_for_sync: bool,
        sync_must_be_valid: bool,
        timeout: Duration,
    ) -> Result<(), GitopsError> {
        let api = self.api();
        let current = api.get(app).await?.git_details();

        if &current == details {
            crate::log_info!(
                "Provided git details are the already configured details in Argocd. No change required."
            );
            return Ok(());
        }

        let patch = json!({
            "spec": {
                "source": {
                    "repoURL": details.repo,
                    "targetRevision": details.branch,
                    "path": details.path,
                }
            }
        });
        api.patch(app, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        crate::log_info!("Updated {} git details to {}", app, details);

        if wait_for_sync {
            self.wait_until_change_is_completed(app, sync_must_be_valid, timeout)
                .await?;
        }

        Ok(())
    }

    /// Poll until Argo CD has compared against the current source
    pub async fn wait_until_change_is_completed(
        &self,
        app: &str,
        sync_must_be_valid: bool,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        crate::log_info!("Waiting for Argocd change to finish syncing");

        let api = &self.api();
        let resource = format!("application {}/{}", self.namespace, app);

        poll_until(&resource, self.interval, timeout, move || async move {
            tracing::debug!("Checking if argo change is complete...");
            match api.get(app).await {
                Ok(application) => {
                    application.log_diagnostics();
                    match application.change_status(sync_must_be_valid) {
                        Ok(()) => PollOutcome::Satisfied,
                        Err(mismatch) => PollOutcome::Pending(mismatch),
                    }
                }
                Err(e) => PollOutcome::from_fetch_error(FetchError::from_kube(&e)),
            }
        })
        .await
    }

    /// ZTP version from the site generator init container of the repo server
    pub async fn ztp_version(&self) -> Result<String, GitopsError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let deployment = deployments.get(REPO_SERVER_DEPLOYMENT).await?;

        deployment
            .spec
            .and_then(|spec| spec.template.spec)
            .and_then(|pod| pod.init_containers)
            .unwrap_or_default()
            .iter()
            .filter_map(|container| container.image.as_deref())
            .find_map(ztp_version_from_image)
            .ok_or(GitopsError::ZtpVersionNotFound)
    }
}
