//! Argo CD and git helpers for the ZTP pipeline

pub mod application;
pub mod paths;

use thiserror::Error;

use crate::wait::WaitError;

pub use application::{
    ARGOCD_CHANGE_TIMEOUT, Application, ArgoCd, GitDetails, OPENSHIFT_GITOPS_NAMESPACE,
};
pub use paths::{does_git_path_exist, git_raw_url, join_git_paths, ztp_version_from_image};

/// Argo CD applications ZTP deploys from git
pub const ZTP_APPS: &[&str] = &["clusters", "policies"];

#[derive(Error, Debug)]
pub enum GitopsError {
    #[error("unable to identify ztp version")]
    ZtpVersionNotFound,

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
