//! Argo CD application commands

use anyhow::{Context, Result};
use std::time::Duration;

use super::{ClusterRole, connect};
use crate::config::Settings;
use crate::gitops::{ArgoCd, GitDetails, ZTP_APPS, does_git_path_exist};

async fn hub_argocd(settings: &Settings) -> Result<ArgoCd> {
    let hub = connect(&settings.clusters, ClusterRole::Hub).await?;
    Ok(ArgoCd::new(hub.client)
        .with_namespace(&settings.argocd.namespace)
        .with_interval(settings.argocd.interval()))
}

/// Print git details of the given applications, or of every ZTP application
pub async fn show(settings: &Settings, apps: Vec<String>) -> Result<()> {
    let argocd = hub_argocd(settings).await?;
    let apps = if apps.is_empty() {
        ZTP_APPS.iter().map(|app| app.to_string()).collect()
    } else {
        apps
    };

    for app in &apps {
        let details = argocd
            .get_git_details(app)
            .await
            .with_context(|| format!("Failed to get git details of application {}", app))?;
        println!("{}: {}", app, details);
    }

    Ok(())
}

/// Options for `argocd set-git`
pub struct SetGitOptions {
    pub app: String,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub path: Option<String>,
    pub no_wait: bool,
    pub require_synced: bool,
    pub check_path: bool,
    pub timeout: Option<Duration>,
}

impl SetGitOptions {
    /// Current details with the provided fields replaced
    fn apply(&self, current: &GitDetails) -> GitDetails {
        GitDetails {
            repo: self.repo.clone().unwrap_or_else(|| current.repo.clone()),
            branch: self.branch.clone().unwrap_or_else(|| current.branch.clone()),
            path: self.path.clone().unwrap_or_else(|| current.path.clone()),
        }
    }
}

pub async fn set_git(settings: &Settings, opts: SetGitOptions) -> Result<()> {
    let argocd = hub_argocd(settings).await?;
    let current = argocd.get_git_details(&opts.app).await?;
    let details = opts.apply(&current);

    if opts.check_path
        && !does_git_path_exist(&details.repo, &details.branch, &details.path).await?
    {
        anyhow::bail!(
            "Git path '{}' does not exist on {} @ {}",
            details.path,
            details.repo,
            details.branch
        );
    }

    let timeout = opts.timeout.unwrap_or(settings.argocd.timeout());
    argocd
        .set_git_details(&opts.app, &details, !opts.no_wait, opts.require_synced, timeout)
        .await?;

    crate::log_info!("Application {} now tracks {}", opts.app, details);
    Ok(())
}
