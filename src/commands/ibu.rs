//! Image based upgrade commands

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::{ClusterRole, connect};
use crate::config::Settings;
use crate::ibu::cluster_info::pods_named_after;
use crate::ibu::{ClusterInfo, Ibu, IbuStage, validate_upgrade};
use crate::utils::progress::with_wait_progress;

/// Move the upgrade to `stage`, optionally waiting for it to complete
pub async fn set_stage(
    settings: &Settings,
    cluster: ClusterRole,
    stage: &str,
    wait: bool,
    timeout: Option<Duration>,
) -> Result<()> {
    let stage: IbuStage = stage.parse()?;
    let handle = connect(&settings.clusters, cluster).await?;
    let ibu = Ibu::new(handle.client).with_poll_interval(settings.ibu.poll_interval());

    ibu.set_stage(stage).await?;
    crate::log_info!("Image based upgrade on '{}' set to {}", handle.name, stage);

    if wait {
        let timeout = timeout.unwrap_or(settings.ibu.stage_timeout());
        let condition = stage.completed_condition();
        with_wait_progress(
            "ibu upgrade",
            &condition.condition_type,
            ibu.wait_for_stage(stage, timeout),
        )
        .await?;
        crate::log_info!("Image based upgrade on '{}' completed {}", handle.name, stage);
    }

    Ok(())
}

pub async fn set_seed_image(
    settings: &Settings,
    cluster: ClusterRole,
    image: &str,
    version: &str,
) -> Result<()> {
    let handle = connect(&settings.clusters, cluster).await?;
    Ibu::new(handle.client).set_seed_image(image, version).await?;
    crate::log_info!("Seed image of '{}' set to {} ({})", handle.name, image, version);
    Ok(())
}

/// Print the cluster snapshot, and save it when `output` is given
pub async fn cluster_info(
    settings: &Settings,
    cluster: ClusterRole,
    output: Option<&Path>,
) -> Result<()> {
    let handle = connect(&settings.clusters, cluster).await?;
    let info = ClusterInfo::collect(handle.client).await?;
    let json = serde_json::to_string_pretty(&info)?;

    match output {
        Some(path) => {
            fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
            crate::log_info!("Cluster info of '{}' saved to {}", handle.name, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Compare the cluster with a snapshot saved before the upgrade
pub async fn validate(
    settings: &Settings,
    cluster: ClusterRole,
    before: &Path,
    seed_node: Option<&str>,
) -> Result<()> {
    let before = read_snapshot(before)?;
    let handle = connect(&settings.clusters, cluster).await?;
    let after = ClusterInfo::collect(handle.client.clone()).await?;

    validate_upgrade(&before, &after)?;

    if let Some(seed_node) = seed_node {
        let leftovers = pods_named_after(handle.client, seed_node).await?;
        if !leftovers.is_empty() {
            anyhow::bail!(
                "Pods still named after seed node {}: {}",
                seed_node,
                leftovers.join(", ")
            );
        }
    }

    crate::log_info!(
        "Cluster '{}' upgraded from {} to {}",
        handle.name,
        before.version,
        after.version
    );
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<ClusterInfo> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse cluster info in {}", path.display()))
}
