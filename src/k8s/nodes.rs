//! Node management operations

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client};
use regex::Regex;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::k8s::kubectl::{CommandError, CommandRunner, bash};
use crate::wait::{FetchError, Mismatch, PollOutcome, WaitError, poll_until};

/// Deployment that only turns available again once the node is back from a crash
pub const OPENSHIFT_APISERVER_DEPLOYMENT: &str = "apiserver";
pub const OPENSHIFT_APISERVER_NAMESPACE: &str = "openshift-apiserver";
pub const KDUMP_RECOVERY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const KDUMP_RECOVERY_INTERVAL: Duration = Duration::from_secs(10);

/// Kernel arguments a DU profile without workload hints puts on the command line
pub const DEFAULT_KERNEL_PARAMETERS: &[&str] = &[
    "nohz_full=[0-9,-]+",
    "tsc=nowatchdog",
    "nosoftlockup",
    "nmi_watchdog=0",
    "mce=off",
    "skew_tick=1",
    "intel_pstate=disable",
];

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("invalid kernel parameter pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("cpu{cpu} {setting} is '{actual}', expected '{expected}'")]
    CpuSetting {
        cpu: u32,
        setting: &'static str,
        actual: String,
        expected: String,
    },
}

/// Reboot `node` through systemd on the host
pub async fn soft_reboot_node<R: CommandRunner + ?Sized>(
    runner: &R,
    node: &str,
) -> Result<(), NodeError> {
    crate::log_info!("Soft rebooting node {}", node);
    let argv: Vec<String> = ["chroot", "/rootfs", "systemctl", "reboot"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    runner.run(node, &argv).await?;
    Ok(())
}

pub async fn read_kernel_cmdline<R: CommandRunner + ?Sized>(
    runner: &R,
    node: &str,
) -> Result<String, NodeError> {
    let argv: Vec<String> = ["chroot", "/rootfs", "cat", "/proc/cmdline"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    Ok(runner.run(node, &argv).await?)
}

/// Patterns from `patterns` with no match in `cmdline`
pub fn missing_kernel_parameters<S: AsRef<str>>(
    cmdline: &str,
    patterns: &[S],
) -> Result<Vec<String>, NodeError> {
    let mut missing = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        if !Regex::new(pattern)?.is_match(cmdline) {
            missing.push(pattern.to_string());
        }
    }
    Ok(missing)
}

/// Compare resume latency and frequency governor of each CPU with the expected values
pub async fn check_cpu_power_settings<R: CommandRunner + ?Sized>(
    runner: &R,
    node: &str,
    cpus: &[u32],
    pm_qos: &str,
    governor: &str,
) -> Result<(), NodeError> {
    for &cpu in cpus {
        let checks = [
            (
                "pm_qos_resume_latency_us",
                format!("/sys/devices/system/cpu/cpu{}/power/pm_qos_resume_latency_us", cpu),
                pm_qos,
            ),
            (
                "scaling_governor",
                format!("/sys/devices/system/cpu/cpu{}/cpufreq/scaling_governor", cpu),
                governor,
            ),
        ];

        for (setting, path, expected) in checks {
            let output = runner.run(node, &bash(format!("cat {}", path))).await?;
            let actual = output.trim_end_matches(['\r', '\n']);
            if actual != expected {
                return Err(NodeError::CpuSetting {
                    cpu,
                    setting,
                    actual: actual.to_string(),
                    expected: expected.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Names of nodes without a `Ready=True` condition
pub fn not_ready_nodes(nodes: &[Node]) -> Vec<String> {
    nodes
        .iter()
        .filter(|node| {
            !node
                .status
                .as_ref()
                .and_then(|status| status.conditions.as_ref())
                .is_some_and(|conditions| {
                    conditions
                        .iter()
                        .any(|c| c.type_ == "Ready" && c.status == "True")
                })
        })
        .map(|node| node.metadata.name.clone().unwrap_or_default())
        .collect()
}

/// Wait until every node reports ready. API errors are expected while nodes reboot and
/// only delay the wait.
pub async fn wait_for_nodes_ready(
    client: Client,
    interval: Duration,
    timeout: Duration,
) -> Result<(), WaitError> {
    let api: &Api<Node> = &Api::all(client);

    poll_until("nodes", interval, timeout, move || async move {
        match api.list(&ListParams::default()).await {
            Ok(nodes) => {
                let not_ready = not_ready_nodes(&nodes.items);
                if not_ready.is_empty() {
                    PollOutcome::Satisfied
                } else {
                    let names = not_ready.join(", ");
                    PollOutcome::Pending(Mismatch::Other(format!("nodes not ready: {}", names)))
                }
            }
            Err(e) => PollOutcome::Pending(Mismatch::Unavailable(e.to_string())),
        }
    })
    .await
}

/// Crash the kernel of `node` through sysrq so kdump writes a vmcore, then wait for the
/// OpenShift API server deployment to become available again.
///
/// Old dumps under `/var/crash` are removed first so the next dump is the only one.
pub async fn kernel_crash_kdump<R: CommandRunner + ?Sized>(
    client: Client,
    runner: &R,
    node: &str,
    timeout: Duration,
) -> Result<(), NodeError> {
    let api: &Api<Deployment> = &Api::namespaced(client, OPENSHIFT_APISERVER_NAMESPACE);
    api.get(OPENSHIFT_APISERVER_DEPLOYMENT).await?;

    let clear: Vec<String> = ["chroot", "/rootfs", "/bin/sh", "-c", "rm -rf /var/crash/*"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    tracing::debug!(node, "removing existing crash dumps");
    runner.run(node, &clear).await?;

    let trigger: Vec<String> = ["/bin/sh", "-c", "echo c > /proc/sysrq-trigger"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    crate::log_info!("Triggering kernel crash on {}", node);
    // the exec session dies with the kernel
    if let Err(e) = runner.run(node, &trigger).await {
        tracing::debug!(node, error = %e, "sysrq trigger exec ended with an error");
    }

    let resource = format!(
        "deployment {}/{}",
        OPENSHIFT_APISERVER_NAMESPACE, OPENSHIFT_APISERVER_DEPLOYMENT
    );
    poll_until(&resource, KDUMP_RECOVERY_INTERVAL, timeout, move || async move {
        match api.get(OPENSHIFT_APISERVER_DEPLOYMENT).await {
            Ok(deployment) if is_deployment_available(&deployment) => PollOutcome::Satisfied,
            Ok(_) => {
                PollOutcome::Pending(Mismatch::Other("deployment is not Available".to_string()))
            }
            Err(e) => PollOutcome::from_fetch_error(FetchError::from_kube(&e)),
        }
    })
    .await?;

    Ok(())
}

fn is_deployment_available(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        })
}

pub async fn is_single_node_cluster(client: Client) -> Result<bool, NodeError> {
    let api: Api<Node> = Api::all(client);
    Ok(api.list(&ListParams::default()).await?.items.len() == 1)
}

/// Whole minutes from `start` to `end`, zero if `end` is earlier
pub fn elapsed_minutes(start: SystemTime, end: SystemTime) -> u64 {
    end.duration_since(start).unwrap_or_default().as_secs() / 60
}
