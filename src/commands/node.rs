//! Node commands run through the privileged helper pods

use anyhow::{Context, Result, bail};
use std::time::{Duration, SystemTime};

use super::{ClusterRole, connect};
use crate::config::Settings;
use crate::k8s::nodes::{
    DEFAULT_KERNEL_PARAMETERS, check_cpu_power_settings, elapsed_minutes, kernel_crash_kdump,
    missing_kernel_parameters, read_kernel_cmdline, soft_reboot_node, wait_for_nodes_ready,
};
use crate::k8s::{CommandRunner, KubectlRunner};
use crate::power::profile::parse_cpu_list;
use crate::utils::progress::with_wait_progress;

const NODE_READY_INTERVAL: Duration = Duration::from_secs(30);

fn runner(settings: &Settings, cluster: ClusterRole) -> KubectlRunner {
    KubectlRunner::new(cluster.kubeconfig(&settings.clusters).cloned())
}

/// Soft reboot a node, optionally waiting for every node to become ready again
pub async fn reboot(
    settings: &Settings,
    cluster: ClusterRole,
    node: &str,
    wait: Option<Duration>,
) -> Result<()> {
    let handle = connect(&settings.clusters, cluster).await?;
    let started = SystemTime::now();

    soft_reboot_node(&runner(settings, cluster), node).await?;

    if let Some(timeout) = wait {
        with_wait_progress(
            "nodes",
            "Ready",
            wait_for_nodes_ready(handle.client, NODE_READY_INTERVAL, timeout),
        )
        .await?;
        crate::log_info!(
            "Nodes ready {} minutes after rebooting {}",
            elapsed_minutes(started, SystemTime::now()),
            node
        );
    }

    Ok(())
}

/// Crash the node kernel so kdump writes a vmcore, then wait for the API to come back
pub async fn kdump(
    settings: &Settings,
    cluster: ClusterRole,
    node: &str,
    timeout: Duration,
) -> Result<()> {
    let handle = connect(&settings.clusters, cluster).await?;
    let started = SystemTime::now();

    with_wait_progress(
        "deployment openshift-apiserver/apiserver",
        "Available",
        kernel_crash_kdump(handle.client, &runner(settings, cluster), node, timeout),
    )
    .await?;

    crate::log_info!(
        "API server available {} minutes after crashing {}",
        elapsed_minutes(started, SystemTime::now()),
        node
    );
    Ok(())
}

/// Run a shell-style command line on a node and print its output
pub async fn exec(
    settings: &Settings,
    cluster: ClusterRole,
    node: &str,
    command: &str,
) -> Result<()> {
    let argv = shell_words::split(command)
        .with_context(|| format!("Failed to parse command '{}'", command))?;
    if argv.is_empty() {
        bail!("No command given");
    }

    let output = runner(settings, cluster).run(node, &argv).await?;
    print!("{}", output);
    Ok(())
}

/// Verify kernel arguments on the node command line
pub async fn check_kernel(
    settings: &Settings,
    cluster: ClusterRole,
    node: &str,
    params: Vec<String>,
) -> Result<()> {
    let cmdline = read_kernel_cmdline(&runner(settings, cluster), node).await?;

    let missing = if params.is_empty() {
        missing_kernel_parameters(&cmdline, DEFAULT_KERNEL_PARAMETERS)?
    } else {
        missing_kernel_parameters(&cmdline, params.as_slice())?
    };

    if !missing.is_empty() {
        bail!(
            "Kernel parameters missing from {} cmdline: {}",
            node,
            missing.join(", ")
        );
    }

    crate::log_info!("All kernel parameters present on {}", node);
    Ok(())
}

/// Verify resume latency and governor of a CPU list such as `2-5,8`
pub async fn check_cpus(
    settings: &Settings,
    cluster: ClusterRole,
    node: &str,
    cpus: &str,
    pm_qos: &str,
    governor: &str,
) -> Result<()> {
    let cpus = parse_cpu_list(cpus)?;
    check_cpu_power_settings(&runner(settings, cluster), node, &cpus, pm_qos, governor).await?;

    crate::log_info!(
        "{} CPUs on {} have pm_qos_resume_latency_us={} and governor {}",
        cpus.len(),
        node,
        pm_qos,
        governor
    );
    Ok(())
}
