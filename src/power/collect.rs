//! Periodic power sampling and reduction into summary metrics

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use super::PowerError;
use super::ipmi::{BmcInfo, INSTANTANEOUS_POWER, PowerReadings, parse_ipmi_power_output};
use super::stats::{self, StatsError};
use crate::k8s::kubectl::CommandRunner;

pub const METRIC_TOTAL_SAMPLES: &str = "ranmetrics_power_total_samples";
pub const METRIC_SAMPLING_INTERVAL_SECONDS: &str = "ranmetrics_power_sampling_interval_seconds";
pub const METRIC_MIN_INSTANT_POWER: &str = "ranmetrics_power_min_instantaneous";
pub const METRIC_MAX_INSTANT_POWER: &str = "ranmetrics_power_max_instantaneous";
pub const METRIC_MEAN_INSTANT_POWER: &str = "ranmetrics_power_mean_instantaneous";
pub const METRIC_STDDEV_INSTANT_POWER: &str = "ranmetrics_power_standard_deviation_instantaneous";
pub const METRIC_MEDIAN_INSTANT_POWER: &str = "ranmetrics_power_median_instantaneous";

/// Scenario name used when sampling an idle node
pub const NO_WORKLOAD_SCENARIO: &str = "noworkload";

/// Metric name to formatted value
pub type PowerMetrics = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq)]
pub struct PowerSample {
    pub timestamp: SystemTime,
    pub readings: PowerReadings,
}

impl PowerSample {
    pub fn instantaneous(&self) -> Option<f64> {
        self.readings.get(INSTANTANEOUS_POWER).copied()
    }
}

/// Statistics of the instantaneous power series
#[derive(Clone, Debug, PartialEq)]
pub struct StatisticsSummary {
    pub total_samples: usize,
    pub sampling_interval: Duration,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
}

impl StatisticsSummary {
    pub fn from_samples(
        samples: &[PowerSample],
        sampling_interval: Duration,
    ) -> Result<Self, StatsError> {
        let series: Vec<f64> = samples.iter().filter_map(PowerSample::instantaneous).collect();

        Ok(Self {
            total_samples: samples.len(),
            sampling_interval,
            min: stats::min(&series)?,
            max: stats::max(&series)?,
            mean: stats::mean(&series)?,
            std_dev: stats::std_dev(&series)?,
            median: stats::median(&series)?,
        })
    }

    /// Flatten into `<metric>_<scenario>_<tag>` keys
    pub fn to_metrics(&self, scenario: &str, tag: &str) -> PowerMetrics {
        let key = |metric: &str| format!("{}_{}_{}", metric, scenario, tag);

        BTreeMap::from([
            (key(METRIC_TOTAL_SAMPLES), format!("{}", self.total_samples)),
            (
                key(METRIC_SAMPLING_INTERVAL_SECONDS),
                format!("{:.0}", self.sampling_interval.as_secs_f64()),
            ),
            (key(METRIC_MIN_INSTANT_POWER), format!("{:.7}", self.min)),
            (key(METRIC_MAX_INSTANT_POWER), format!("{:.7}", self.max)),
            (key(METRIC_MEAN_INSTANT_POWER), format!("{:.7}", self.mean)),
            (key(METRIC_STDDEV_INSTANT_POWER), format!("{:.7}", self.std_dev)),
            (key(METRIC_MEDIAN_INSTANT_POWER), format!("{:.7}", self.median)),
        ])
    }
}

pub fn compute_power_usage_statistics(
    samples: &[PowerSample],
    sampling_interval: Duration,
    scenario: &str,
    tag: &str,
) -> Result<PowerMetrics, StatsError> {
    tracing::debug!(scenario, samples = samples.len(), "computing power usage statistics");
    Ok(StatisticsSummary::from_samples(samples, sampling_interval)?.to_metrics(scenario, tag))
}

/// Read the host power usage once through the BMC
pub async fn get_host_power_usage<R>(
    runner: &R,
    node: &str,
    bmc: &BmcInfo,
) -> Result<PowerReadings, PowerError>
where
    R: CommandRunner + ?Sized,
{
    let output = runner.run(node, &bmc.power_reading_command()).await?;
    Ok(parse_ipmi_power_output(&output))
}

/// Sample power every `interval` for `duration`, then summarize.
///
/// The first sample is taken immediately. Each sample runs in its own task so a slow
/// BMC does not stretch the interval; all tasks are joined before reducing. Failed
/// samples, and samples without an instantaneous reading, are skipped.
pub async fn collect_power_usage_metrics<R>(
    runner: Arc<R>,
    node: &str,
    bmc: &BmcInfo,
    duration: Duration,
    interval: Duration,
    scenario: &str,
    tag: &str,
) -> Result<PowerMetrics, PowerError>
where
    R: CommandRunner + Send + Sync + 'static,
{
    if interval.is_zero() {
        return Err(PowerError::ZeroInterval);
    }

    let start = Instant::now();
    let started_at = SystemTime::now();
    let mut tasks = JoinSet::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let elapsed = start.elapsed();

        let runner = Arc::clone(&runner);
        let node = node.to_string();
        let bmc = bmc.clone();
        tasks.spawn(async move {
            let timestamp = SystemTime::now();
            let readings = get_host_power_usage(runner.as_ref(), &node, &bmc).await;
            (timestamp, readings)
        });

        if elapsed + interval >= duration {
            break;
        }
    }

    let mut samples = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((timestamp, Ok(readings))) if readings.contains_key(INSTANTANEOUS_POWER) => {
                samples.push(PowerSample { timestamp, readings });
            }
            Ok((_, Ok(_))) => {
                tracing::warn!(node, "power reading had no instantaneous value, skipping");
            }
            Ok((_, Err(e))) => {
                tracing::warn!(node, error = %e, "power sample failed, skipping");
            }
            Err(e) => {
                tracing::warn!(node, error = %e, "power sample task did not complete");
            }
        }
    }
    samples.sort_by_key(|s| s.timestamp);

    tracing::info!(
        node,
        scenario,
        started = ?started_at,
        ended = ?SystemTime::now(),
        samples = samples.len(),
        "power usage sampling finished"
    );

    if samples.is_empty() {
        return Err(PowerError::NoMetrics {
            node: node.to_string(),
        });
    }

    Ok(compute_power_usage_statistics(&samples, interval, scenario, tag)?)
}

/// Sample an idle node under the `noworkload` scenario
pub async fn collect_power_metrics_with_no_workload<R>(
    runner: Arc<R>,
    node: &str,
    bmc: &BmcInfo,
    duration: Duration,
    interval: Duration,
    tag: &str,
) -> Result<PowerMetrics, PowerError>
where
    R: CommandRunner + Send + Sync + 'static,
{
    tracing::info!("Wait for {:?} for {} scenario", duration, NO_WORKLOAD_SCENARIO);
    collect_power_usage_metrics(runner, node, bmc, duration, interval, NO_WORKLOAD_SCENARIO, tag)
        .await
}
