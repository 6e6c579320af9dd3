//! Command implementations for the ztp-e2e CLI

pub mod argocd;
pub mod cgu;
pub mod check;
pub mod env;
pub mod ibu;
pub mod node;
pub mod power;

use anyhow::Result;
use clap::ValueEnum;
use std::path::PathBuf;

use crate::config::ClustersConfig;
use crate::k8s::ClusterHandle;
use crate::utils::E2eError;

/// Which of the clusters under test a command talks to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ClusterRole {
    Hub,
    #[default]
    Spoke1,
    Spoke2,
}

impl ClusterRole {
    /// Environment variable holding the kubeconfig for this role
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Hub => "KUBECONFIG_HUB",
            Self::Spoke1 => "KUBECONFIG",
            Self::Spoke2 => "KUBECONFIG_SPOKE2",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hub => "hub",
            Self::Spoke1 => "spoke1",
            Self::Spoke2 => "spoke2",
        }
    }

    pub fn kubeconfig<'a>(&self, clusters: &'a ClustersConfig) -> Option<&'a PathBuf> {
        match self {
            Self::Hub => clusters.hub_kubeconfig.as_ref(),
            Self::Spoke1 => clusters.spoke1_kubeconfig.as_ref(),
            Self::Spoke2 => clusters.spoke2_kubeconfig.as_ref(),
        }
    }
}

/// Connect to the cluster in `role`, failing with a hint when it is not configured
pub(crate) async fn connect(clusters: &ClustersConfig, role: ClusterRole) -> Result<ClusterHandle> {
    // spoke2 only exists in multi-cluster setups
    let path = role.kubeconfig(clusters).ok_or_else(|| match role {
        ClusterRole::Spoke2 => E2eError::cluster_not_configured(role.name()),
        _ => E2eError::kubeconfig_env_missing(role.env_var()),
    })?;
    Ok(ClusterHandle::connect(path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_kubeconfig_lookup() {
        let clusters = ClustersConfig {
            hub_kubeconfig: Some(PathBuf::from("/kube/hub")),
            spoke1_kubeconfig: None,
            spoke2_kubeconfig: Some(PathBuf::from("/kube/spoke2")),
        };
        assert_eq!(ClusterRole::Hub.kubeconfig(&clusters), Some(&PathBuf::from("/kube/hub")));
        assert_eq!(ClusterRole::Spoke1.kubeconfig(&clusters), None);
        assert_eq!(ClusterRole::Spoke2.env_var(), "KUBECONFIG_SPOKE2");
    }

    #[tokio::test]
    async fn test_connect_unconfigured_role() {
        let err = connect(&ClustersConfig::default(), ClusterRole::Hub)
            .await
            .unwrap_err();
        let e2e = err.downcast_ref::<E2eError>().unwrap();
        assert!(e2e.message.contains("KUBECONFIG_HUB"));
    }

    #[tokio::test]
    async fn test_connect_missing_second_spoke() {
        let err = connect(&ClustersConfig::default(), ClusterRole::Spoke2)
            .await
            .unwrap_err();
        let e2e = err.downcast_ref::<E2eError>().unwrap();
        assert_eq!(e2e.message, "The spoke2 cluster is not configured");
        assert!(e2e.suggestions.iter().any(|s| s.contains("KUBECONFIG_SPOKE2")));
    }
}
