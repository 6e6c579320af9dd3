//! Node power usage sampling over IPMI and its summary statistics

pub mod collect;
pub mod ipmi;
pub mod profile;
pub mod report;
pub mod stats;

use std::path::PathBuf;
use thiserror::Error;

use crate::k8s::kubectl::CommandError;
use crate::wait::WaitError;

pub use collect::{
    NO_WORKLOAD_SCENARIO, PowerMetrics, PowerSample, StatisticsSummary,
    collect_power_metrics_with_no_workload, collect_power_usage_metrics,
    compute_power_usage_statistics, get_host_power_usage,
};
pub use ipmi::{BmcInfo, PowerReadings, parse_ipmi_power_output};
pub use profile::{PerformanceProfile, PowerState, WorkloadHints, is_ipmitool_exist, set_power_mode};
pub use report::write_metrics_report;
pub use stats::StatsError;

#[derive(Error, Debug)]
pub enum PowerError {
    #[error("no BMC hosts configured, please set BMC_HOSTS environment variable")]
    MissingBmcHosts,

    #[error("no power usage metrics were retrieved from node {node}")]
    NoMetrics { node: String },

    #[error("sampling interval must be greater than zero")]
    ZeroInterval,

    #[error("unknown workloadHints power state configuration: {0:?}")]
    UnknownPowerState(WorkloadHints),

    #[error("unknown power mode '{0}', expected performance, highperformance or powersaving")]
    UnknownPowerMode(String),

    #[error("ipmitool is not available on node {node}")]
    IpmitoolMissing { node: String },

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("performance profile with reserved and isolated CPU set is not found")]
    NoProfileWithCpuSet,

    #[error("invalid CPU list '{0}'")]
    InvalidCpuList(String),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error("failed to write metrics report {}: {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),
}
