//! Hub and spoke clusters under test, discovered once per run

use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Client, Config};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::openshift::{get_cluster_version, get_operator_version_from_csv};
use crate::config::ClustersConfig;
use crate::gitops::{ArgoCd, GitopsError};

pub const ACM_OPERATOR_NAME: &str = "advanced-cluster-management";
pub const ACM_OPERATOR_NAMESPACE: &str = "rhacm";
pub const TALM_OPERATOR_NAME: &str = "topology-aware-lifecycle-manager";
pub const TALM_OPERATOR_NAMESPACE: &str = "openshift-operators";

#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("can not load api client from '{path}': {source}")]
    Kubeconfig {
        path: PathBuf,
        #[source]
        source: KubeconfigError,
    },

    #[error("can not parse a cluster name from server url '{0}'")]
    ClusterName(String),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Gitops(#[from] GitopsError),
}

/// One cluster reachable through its own kubeconfig
#[derive(Clone)]
pub struct ClusterHandle {
    pub name: String,
    pub client: Client,
    pub ocp_version: String,
}

impl ClusterHandle {
    pub async fn connect(kubeconfig_path: &Path) -> Result<Self, EnvironmentError> {
        let kubeconfig_error = |source| EnvironmentError::Kubeconfig {
            path: kubeconfig_path.to_path_buf(),
            source,
        };

        let kubeconfig = Kubeconfig::read_from(kubeconfig_path).map_err(kubeconfig_error)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(kubeconfig_error)?;

        let server = config.cluster_url.to_string();
        let name = cluster_name_from_server(&server).ok_or(EnvironmentError::ClusterName(server))?;
        tracing::debug!(cluster = %name, "connecting");

        let client = Client::try_from(config)?;
        let ocp_version = get_cluster_version(client.clone()).await?;
        crate::log_info!("cluster '{}' has OCP version '{}'", name, ocp_version);

        Ok(Self {
            name,
            client,
            ocp_version,
        })
    }
}

impl std::fmt::Debug for ClusterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterHandle")
            .field("name", &self.name)
            .field("ocp_version", &self.ocp_version)
            .finish_non_exhaustive()
    }
}

/// Everything a test run needs to know about its clusters. Built once, then read-only.
#[derive(Debug, Clone, Default)]
pub struct ClusterEnvironment {
    pub hub: Option<ClusterHandle>,
    pub spoke1: Option<ClusterHandle>,
    pub spoke2: Option<ClusterHandle>,
    pub talm_version: String,
    pub ztp_version: String,
    pub acm_version: String,
}

impl ClusterEnvironment {
    /// Connect to every cluster that has a kubeconfig configured. Operator versions
    /// are read from the hub.
    pub async fn discover(clusters: &ClustersConfig) -> Result<Self, EnvironmentError> {
        let mut env = Self::default();

        if let Some(path) = &clusters.hub_kubeconfig {
            let hub = ClusterHandle::connect(path).await?;

            env.acm_version = get_operator_version_from_csv(
                hub.client.clone(),
                ACM_OPERATOR_NAME,
                ACM_OPERATOR_NAMESPACE,
            )
            .await?;
            crate::log_info!("cluster '{}' has ACM version '{}'", hub.name, env.acm_version);

            env.ztp_version = ArgoCd::new(hub.client.clone()).ztp_version().await?;
            crate::log_info!("cluster '{}' has ZTP version '{}'", hub.name, env.ztp_version);

            env.talm_version = get_operator_version_from_csv(
                hub.client.clone(),
                TALM_OPERATOR_NAME,
                TALM_OPERATOR_NAMESPACE,
            )
            .await?;
            crate::log_info!("cluster '{}' has TALM version '{}'", hub.name, env.talm_version);

            env.hub = Some(hub);
        }

        if let Some(path) = &clusters.spoke1_kubeconfig {
            env.spoke1 = Some(ClusterHandle::connect(path).await?);
        }

        if let Some(path) = &clusters.spoke2_kubeconfig {
            env.spoke2 = Some(ClusterHandle::connect(path).await?);
        }

        Ok(env)
    }

    pub fn hub_name(&self) -> Option<&str> {
        self.hub.as_ref().map(|c| c.name.as_str())
    }

    pub fn spoke1_name(&self) -> Option<&str> {
        self.spoke1.as_ref().map(|c| c.name.as_str())
    }

    pub fn spoke2_name(&self) -> Option<&str> {
        self.spoke2.as_ref().map(|c| c.name.as_str())
    }
}

/// Cluster name from an API server URL such as `https://api.sno-1.lab.local:6443`.
///
/// The kubeconfig cluster name is not reliable, the second dot label of the server is.
pub fn cluster_name_from_server(server: &str) -> Option<String> {
    server
        .split('.')
        .nth(1)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}
