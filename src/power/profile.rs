//! PerformanceProfile power modes

use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::PowerError;
use crate::k8s::kubectl::CommandRunner;
use crate::k8s::openshift::{MASTER_MCP_NAME, wait_for_mcp_update};

pub const MCP_UPDATE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Node Tuning Operator PerformanceProfile, reduced to the fields power tests read
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "performance.openshift.io",
    version = "v2",
    kind = "PerformanceProfile",
    plural = "performanceprofiles"
)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceProfileSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_hints: Option<WorkloadHints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct CpuSpec {
    /// CPU list such as `0-1,32-33`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolated: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadHints {
    #[serde(default)]
    pub real_time: bool,

    #[serde(default)]
    pub high_power_consumption: bool,

    #[serde(default)]
    pub per_pod_power_management: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerState {
    Performance,
    HighPerformance,
    PowerSaving,
}

impl PowerState {
    /// Derive the power mode from the profile's workload hints; no hints means performance
    pub fn from_hints(hints: Option<&WorkloadHints>) -> Result<Self, PowerError> {
        let Some(hints) = hints else {
            return Ok(Self::Performance);
        };

        match (
            hints.real_time,
            hints.high_power_consumption,
            hints.per_pod_power_management,
        ) {
            (true, false, false) => Ok(Self::Performance),
            (true, true, false) => Ok(Self::HighPerformance),
            (true, false, true) => Ok(Self::PowerSaving),
            _ => Err(PowerError::UnknownPowerState(*hints)),
        }
    }

    /// Workload hints that select this power mode
    pub fn hints(&self) -> WorkloadHints {
        let (high_power_consumption, per_pod_power_management) = match self {
            Self::Performance => (false, false),
            Self::HighPerformance => (true, false),
            Self::PowerSaving => (false, true),
        };
        WorkloadHints {
            real_time: true,
            high_power_consumption,
            per_pod_power_management,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::HighPerformance => "highperformance",
            Self::PowerSaving => "powersaving",
        }
    }
}

impl FromStr for PowerState {
    type Err = PowerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Performance, Self::HighPerformance, Self::PowerSaving]
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PowerError::UnknownPowerMode(s.to_string()))
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PerformanceProfile {
    pub fn power_state(&self) -> Result<PowerState, PowerError> {
        PowerState::from_hints(self.spec.workload_hints.as_ref())
    }

    fn has_cpu_sets(&self) -> bool {
        self.spec
            .cpu
            .as_ref()
            .is_some_and(|cpu| cpu.reserved.is_some() && cpu.isolated.is_some())
    }
}

/// First profile declaring both reserved and isolated CPU sets
pub async fn get_performance_profile_with_cpu_set(
    client: Client,
) -> Result<PerformanceProfile, PowerError> {
    let api: Api<PerformanceProfile> = Api::all(client);
    let profiles = api.list(&ListParams::default()).await?;

    profiles
        .items
        .into_iter()
        .find(PerformanceProfile::has_cpu_sets)
        .ok_or(PowerError::NoProfileWithCpuSet)
}

/// Switch `profile` to `state` through its workload hints and wait for the master pool
/// to roll the change out. Returns false when the profile was already in that state.
pub async fn set_power_mode(
    client: Client,
    profile: &PerformanceProfile,
    state: PowerState,
    timeout: Duration,
) -> Result<bool, PowerError> {
    let name = profile.metadata.name.as_deref().unwrap_or_default();

    if profile.power_state().ok() == Some(state) {
        crate::log_info!("Performance profile {} is already in {} mode", name, state);
        return Ok(false);
    }

    crate::log_info!("Setting {} mode on performance profile {}", state, name);
    let patch = json!({ "spec": { "workloadHints": state.hints() } });
    let api: Api<PerformanceProfile> = Api::all(client.clone());
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    wait_for_mcp_update(client, MASTER_MCP_NAME, MCP_UPDATE_POLL_INTERVAL, timeout).await?;
    Ok(true)
}

/// Whether `ipmitool` is installed where power readings are taken
pub async fn is_ipmitool_exist<R: CommandRunner + ?Sized>(runner: &R, node: &str) -> bool {
    let argv = ["which".to_string(), "ipmitool".to_string()];
    runner.run(node, &argv).await.is_ok()
}

/// Expand a kernel CPU list (`0-2,8`) into CPU ids
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>, PowerError> {
    let invalid = || PowerError::InvalidCpuList(list.to_string());
    let mut cpus = Vec::new();

    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.trim().parse().map_err(|_| invalid())?;
                let hi: u32 = hi.trim().parse().map_err(|_| invalid())?;
                if lo > hi {
                    return Err(invalid());
                }
                cpus.extend(lo..=hi);
            }
            None => cpus.push(part.parse().map_err(|_| invalid())?),
        }
    }

    Ok(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(rt: bool, hp: bool, pp: bool) -> WorkloadHints {
        WorkloadHints {
            real_time: rt,
            high_power_consumption: hp,
            per_pod_power_management: pp,
        }
    }

    #[test]
    fn test_power_state_table() {
        assert_eq!(PowerState::from_hints(None).unwrap(), PowerState::Performance);
        assert_eq!(
            PowerState::from_hints(Some(&hints(true, false, false))).unwrap(),
            PowerState::Performance
        );
        assert_eq!(
            PowerState::from_hints(Some(&hints(true, true, false))).unwrap(),
            PowerState::HighPerformance
        );
        assert_eq!(
            PowerState::from_hints(Some(&hints(true, false, true))).unwrap(),
            PowerState::PowerSaving
        );
    }

    #[test]
    fn test_unknown_combinations() {
        assert!(PowerState::from_hints(Some(&hints(false, false, false))).is_err());
        assert!(PowerState::from_hints(Some(&hints(true, true, true))).is_err());
    }

    #[test]
    fn test_hints_select_the_same_state() {
        for state in [PowerState::Performance, PowerState::HighPerformance, PowerState::PowerSaving] {
            assert_eq!(PowerState::from_hints(Some(&state.hints())).unwrap(), state);
            assert_eq!(state.as_str().parse::<PowerState>().unwrap(), state);
        }
        assert_eq!("PowerSaving".parse::<PowerState>().unwrap(), PowerState::PowerSaving);
        assert!(matches!(
            "turbo".parse::<PowerState>(),
            Err(PowerError::UnknownPowerMode(_))
        ));
    }

    #[tokio::test]
    async fn test_is_ipmitool_exist() {
        use crate::k8s::kubectl::testing::FakeRunner;

        let installed = FakeRunner::default().respond("which ipmitool", "/usr/bin/ipmitool\n");
        assert!(is_ipmitool_exist(&installed, "sno-0").await);
        assert_eq!(installed.calls()[0].1, "which ipmitool");

        assert!(!is_ipmitool_exist(&FakeRunner::default(), "sno-0").await);
    }

    #[test]
    fn test_power_state_names() {
        assert_eq!(PowerState::HighPerformance.to_string(), "highperformance");
        assert_eq!(PowerState::PowerSaving.as_str(), "powersaving");
    }

    #[test]
    fn test_profile_deserializes() {
        let json = r#"{
            "apiVersion": "performance.openshift.io/v2",
            "kind": "PerformanceProfile",
            "metadata": {"name": "openshift-node-performance-profile"},
            "spec": {
                "cpu": {"reserved": "0-1", "isolated": "2-7"},
                "workloadHints": {"realTime": true, "perPodPowerManagement": true}
            }
        }"#;
        let profile: PerformanceProfile = serde_json::from_str(json).unwrap();
        assert!(profile.has_cpu_sets());
        assert_eq!(profile.power_state().unwrap(), PowerState::PowerSaving);
    }

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-2,8").unwrap(), vec![0, 1, 2, 8]);
        assert_eq!(parse_cpu_list("5").unwrap(), vec![5]);
        assert!(parse_cpu_list("").unwrap().is_empty());
        assert!(parse_cpu_list("3-1").is_err());
        assert!(parse_cpu_list("a-b").is_err());
    }

    mod api {
        use super::*;
        use crate::k8s::mock::{Exchange, mock_client, serve};
        use http::Method;
        use serde_json::{Value, json};

        const PROFILE_PATH: &str =
            "/apis/performance.openshift.io/v2/performanceprofiles/openshift-node-performance-profile";
        const MCP_PATH: &str = "/apis/machineconfiguration.openshift.io/v1/machineconfigpools/master";

        fn profile(hints: Value) -> PerformanceProfile {
            serde_json::from_value(json!({
                "apiVersion": "performance.openshift.io/v2",
                "kind": "PerformanceProfile",
                "metadata": {"name": "openshift-node-performance-profile"},
                "spec": {"cpu": {"reserved": "0-1", "isolated": "2-7"}, "workloadHints": hints}
            }))
            .unwrap()
        }

        fn mcp(updating: &str, updated: &str) -> Value {
            json!({
                "apiVersion": "machineconfiguration.openshift.io/v1",
                "kind": "MachineConfigPool",
                "metadata": {"name": "master"},
                "spec": {},
                "status": {
                    "machineCount": 1,
                    "updatedMachineCount": if updated == "True" { 1 } else { 0 },
                    "conditions": [
                        {"type": "Updating", "status": updating},
                        {"type": "Updated", "status": updated}
                    ]
                }
            })
        }

        #[tokio::test(start_paused = true)]
        async fn test_set_power_mode_patches_and_waits_for_rollout() {
            let current = profile(json!({"realTime": true}));
            let (client, handle) = mock_client();
            let server = serve(
                handle,
                vec![
                    Exchange::ok(Method::PATCH, PROFILE_PATH, &current),
                    Exchange::ok(Method::GET, MCP_PATH, mcp("False", "True")),
                    Exchange::ok(Method::GET, MCP_PATH, mcp("True", "False")),
                    Exchange::ok(Method::GET, MCP_PATH, mcp("True", "False")),
                    Exchange::ok(Method::GET, MCP_PATH, mcp("False", "True")),
                ],
            );

            let changed = set_power_mode(client, &current, PowerState::PowerSaving, Duration::from_secs(600))
                .await
                .unwrap();
            assert!(changed);

            let bodies = server.await.unwrap();
            assert_eq!(
                bodies[0],
                json!({"spec": {"workloadHints": {
                    "realTime": true,
                    "highPowerConsumption": false,
                    "perPodPowerManagement": true
                }}})
            );
        }

        #[tokio::test]
        async fn test_set_power_mode_noop_when_already_set() {
            let current = profile(json!({"realTime": true, "perPodPowerManagement": true}));
            let (client, handle) = mock_client();
            let server = serve(handle, vec![]);

            let changed = set_power_mode(client, &current, PowerState::PowerSaving, Duration::from_secs(600))
                .await
                .unwrap();
            assert!(!changed);
            assert!(server.await.unwrap().is_empty());
        }
    }
}
