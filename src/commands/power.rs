//! Power measurement commands

use anyhow::{Context, Result, bail};
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{ClusterRole, connect};
use crate::config::Settings;
use crate::k8s::KubectlRunner;
use crate::power::profile::get_performance_profile_with_cpu_set;
use crate::power::{
    BmcInfo, NO_WORKLOAD_SCENARIO, PowerError, PowerMetrics, PowerState,
    collect_power_usage_metrics, is_ipmitool_exist, parse_ipmi_power_output, set_power_mode,
    write_metrics_report,
};
use crate::utils::progress::with_wait_progress;

/// Options for `power collect`
pub struct CollectOptions {
    pub cluster: ClusterRole,
    pub node: Option<String>,
    pub duration: Option<Duration>,
    pub interval: Option<Duration>,
    pub scenario: Option<String>,
    pub tag: Option<String>,
}

pub async fn collect(settings: &Settings, opts: CollectOptions) -> Result<()> {
    let (user, password, hosts) = settings.power.bmc_credentials()?;
    let bmc = BmcInfo::from_hosts(user, password, hosts)?;

    let cluster = connect(&settings.clusters, opts.cluster).await?;
    let node = match opts.node {
        Some(node) => node,
        None => single_node_name(cluster.client.clone()).await?,
    };

    let tag = match opts.tag {
        Some(tag) => tag,
        None => get_performance_profile_with_cpu_set(cluster.client.clone())
            .await?
            .power_state()?
            .to_string(),
    };
    let scenario = opts.scenario.as_deref().unwrap_or(NO_WORKLOAD_SCENARIO);
    let duration = opts.duration.unwrap_or(settings.power.no_workload_duration());
    let interval = opts.interval.unwrap_or(settings.power.sampling_interval());

    crate::log_info!(
        "Sampling power on {} every {:?} for {:?} ({} / {})",
        node,
        interval,
        duration,
        scenario,
        tag
    );

    let runner = Arc::new(KubectlRunner::new(
        opts.cluster.kubeconfig(&settings.clusters).cloned(),
    ));
    if !is_ipmitool_exist(&*runner, &node).await {
        return Err(PowerError::IpmitoolMissing { node }.into());
    }

    let metrics = with_wait_progress(
        &format!("node {}", node),
        "sampled",
        collect_power_usage_metrics(runner, &node, &bmc, duration, interval, scenario, &tag),
    )
    .await?;

    print!("{}", format_metrics(&metrics));

    let name = format!("power_{}_{}", scenario, tag);
    let path = write_metrics_report(&settings.report.dir, &name, &metrics)?;
    crate::log_info!("Power metrics written to {}", path.display());
    Ok(())
}

/// Parse `ipmitool dcmi power reading` output from a file or stdin
pub fn parse(input: Option<PathBuf>) -> Result<()> {
    let output = match input {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let readings = parse_ipmi_power_output(&output);
    if readings.is_empty() {
        crate::log_warn!("No power readings found in input");
    }

    println!("{}", serde_json::to_string_pretty(&readings)?);
    Ok(())
}

/// Print the power state configured by the performance profile
pub async fn state(settings: &Settings, cluster: ClusterRole) -> Result<()> {
    let cluster = connect(&settings.clusters, cluster).await?;
    let profile = get_performance_profile_with_cpu_set(cluster.client).await?;

    let name = profile.metadata.name.as_deref().unwrap_or_default();
    let hints = profile.spec.workload_hints.unwrap_or_default();
    println!("Performance profile: {}", name);
    println!("  realTime:              {}", hints.real_time);
    println!("  highPowerConsumption:  {}", hints.high_power_consumption);
    println!("  perPodPowerManagement: {}", hints.per_pod_power_management);
    println!("Power state: {}", profile.power_state()?);
    Ok(())
}

/// Switch the performance profile workload hints to `mode` and wait for the rollout
pub async fn set_mode(
    settings: &Settings,
    cluster: ClusterRole,
    mode: &str,
    timeout: Duration,
) -> Result<()> {
    let state: PowerState = mode.parse()?;
    let cluster = connect(&settings.clusters, cluster).await?;
    let profile = get_performance_profile_with_cpu_set(cluster.client.clone()).await?;

    let changed = with_wait_progress(
        "machineconfigpool master",
        "Updated",
        set_power_mode(cluster.client, &profile, state, timeout),
    )
    .await?;

    if changed {
        crate::log_info!("Power state of cluster '{}' is now {}", cluster.name, state);
    } else {
        crate::log_info!("Cluster '{}' already in power state {}", cluster.name, state);
    }
    Ok(())
}

async fn single_node_name(client: Client) -> Result<String> {
    let nodes: Api<Node> = Api::all(client);
    let mut items = nodes.list(&ListParams::default()).await?.items;

    if items.len() != 1 {
        bail!(
            "Cluster has {} nodes, pass --node to choose which one to sample",
            items.len()
        );
    }

    items
        .pop()
        .and_then(|node| node.metadata.name)
        .context("Node has no name")
}

fn format_metrics(metrics: &PowerMetrics) -> String {
    let width = metrics.keys().map(String::len).max().unwrap_or_default();
    metrics
        .iter()
        .map(|(name, value)| format!("{:<width$}  {}\n", name, value, width = width))
        .collect()
}
