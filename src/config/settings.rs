//! Configuration file support for ztp-e2e

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "ZTP_E2E_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file: {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} is not set, please check the environment or the [{section}] config section")]
    Missing {
        name: &'static str,
        section: &'static str,
    },
}

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub clusters: ClustersConfig,

    #[serde(default)]
    pub talm: TalmSettings,

    #[serde(default)]
    pub argocd: ArgoCdSettings,

    #[serde(default)]
    pub power: PowerSettings,

    #[serde(default)]
    pub ibu: IbuSettings,

    #[serde(default)]
    pub report: ReportSettings,
}

/// Kubeconfig files of the clusters under test
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ClustersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_kubeconfig: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoke1_kubeconfig: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoke2_kubeconfig: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TalmSettings {
    #[serde(default = "default_talm_namespace")]
    pub namespace: String,

    #[serde(default = "default_talm_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_talm_timeout_secs")]
    pub timeout_secs: u64,

    /// Overrides the TALM version read from the hub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ArgoCdSettings {
    #[serde(default = "default_argocd_namespace")]
    pub namespace: String,

    #[serde(default = "default_argocd_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_argocd_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PowerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc_user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc_password: Option<String>,

    /// Comma separated BMC addresses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc_hosts: Option<String>,

    #[serde(default = "default_sampling_interval_secs")]
    pub sampling_interval_secs: u64,

    #[serde(default = "default_no_workload_duration_secs")]
    pub no_workload_duration_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IbuSettings {
    #[serde(default = "default_ibu_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound for a single stage, node reboots included
    #[serde(default = "default_ibu_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReportSettings {
    #[serde(default = "default_report_dir")]
    pub dir: PathBuf,
}

fn default_talm_namespace() -> String {
    crate::talm::TALM_TEST_NAMESPACE.to_string()
}

fn default_talm_poll_interval_secs() -> u64 {
    5
}

fn default_talm_timeout_secs() -> u64 {
    10 * 60
}

fn default_argocd_namespace() -> String {
    crate::gitops::OPENSHIFT_GITOPS_NAMESPACE.to_string()
}

fn default_argocd_interval_secs() -> u64 {
    10
}

fn default_argocd_timeout_secs() -> u64 {
    10 * 60
}

fn default_sampling_interval_secs() -> u64 {
    30
}

fn default_no_workload_duration_secs() -> u64 {
    5 * 60
}

fn default_ibu_poll_interval_secs() -> u64 {
    10
}

fn default_ibu_stage_timeout_secs() -> u64 {
    3600
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("/tmp/reports")
}

impl Default for TalmSettings {
    fn default() -> Self {
        Self {
            namespace: default_talm_namespace(),
            poll_interval_secs: default_talm_poll_interval_secs(),
            timeout_secs: default_talm_timeout_secs(),
            version: None,
        }
    }
}

impl Default for ArgoCdSettings {
    fn default() -> Self {
        Self {
            namespace: default_argocd_namespace(),
            interval_secs: default_argocd_interval_secs(),
            timeout_secs: default_argocd_timeout_secs(),
        }
    }
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            bmc_user: None,
            bmc_password: None,
            bmc_hosts: None,
            sampling_interval_secs: default_sampling_interval_secs(),
            no_workload_duration_secs: default_no_workload_duration_secs(),
        }
    }
}

impl Default for IbuSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_ibu_poll_interval_secs(),
            stage_timeout_secs: default_ibu_stage_timeout_secs(),
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            dir: default_report_dir(),
        }
    }
}

impl TalmSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ArgoCdSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PowerSettings {
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }

    pub fn no_workload_duration(&self) -> Duration {
        Duration::from_secs(self.no_workload_duration_secs)
    }

    /// BMC user, password and host list, all of which must be set
    pub fn bmc_credentials(&self) -> Result<(&str, &str, &str), ConfigError> {
        Ok((
            required(&self.bmc_user, "BMC_USER")?,
            required(&self.bmc_password, "BMC_PASSWORD")?,
            required(&self.bmc_hosts, "BMC_HOSTS")?,
        ))
    }
}

impl IbuSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing {
            name,
            section: "power",
        })
}

impl Settings {
    /// Load settings from `explicit`, `$ZTP_E2E_CONFIG` or the standard locations,
    /// falling back to defaults, then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut settings = match explicit.or_else(Self::find_config_file) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::load_from_file(&path)?
            }
            None => Self::default(),
        };

        settings.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find config file in standard locations
    /// Priority:
    /// 1. .ztp-e2e.toml in current directory
    /// 2. ~/.config/ztp-e2e/config.toml (XDG config directory)
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(".ztp-e2e.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("ztp-e2e").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Non-empty environment variables win over file values
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(path) = get("KUBECONFIG_HUB") {
            self.clusters.hub_kubeconfig = Some(PathBuf::from(path));
        }
        // The spoke is the default kubeconfig
        if let Some(path) = get("KUBECONFIG") {
            self.clusters.spoke1_kubeconfig = Some(PathBuf::from(path));
        }
        if let Some(path) = get("KUBECONFIG_SPOKE2") {
            self.clusters.spoke2_kubeconfig = Some(PathBuf::from(path));
        }

        if let Some(user) = get("BMC_USER") {
            self.power.bmc_user = Some(user);
        }
        if let Some(password) = get("BMC_PASSWORD") {
            self.power.bmc_password = Some(password);
        }
        if let Some(hosts) = get("BMC_HOSTS") {
            self.power.bmc_hosts = Some(hosts);
        }

        if let Some(dir) = get("REPORT_DIR_NAME") {
            self.report.dir = PathBuf::from(dir);
        }
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Generate example config file content
    pub fn example_config() -> Result<String, ConfigError> {
        let header = "# ztp-e2e configuration file\n\
                      # Place this file at ~/.config/ztp-e2e/config.toml or .ztp-e2e.toml in your project\n\n";
        Ok(format!("{}{}", header, toml::to_string_pretty(&Settings::default())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.talm.namespace, "talm-test");
        assert_eq!(settings.talm.poll_interval(), Duration::from_secs(5));
        assert_eq!(settings.argocd.namespace, "openshift-gitops");
        assert_eq!(settings.power.sampling_interval(), Duration::from_secs(30));
        assert_eq!(settings.power.no_workload_duration(), Duration::from_secs(300));
        assert_eq!(settings.ibu.stage_timeout(), Duration::from_secs(3600));
        assert_eq!(settings.clusters, ClustersConfig::default());
    }

    #[test]
    fn test_settings_deserialization() {
        let toml_str = r#"
[clusters]
hub_kubeconfig = "/kube/hub"

[power]
bmc_user = "root"
sampling_interval_secs = 10

[report]
dir = "/var/reports"
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.clusters.hub_kubeconfig, Some(PathBuf::from("/kube/hub")));
        assert_eq!(settings.power.bmc_user.as_deref(), Some("root"));
        assert_eq!(settings.power.sampling_interval_secs, 10);
        assert_eq!(settings.power.no_workload_duration_secs, 300);
        assert_eq!(settings.report.dir, PathBuf::from("/var/reports"));
        assert_eq!(settings.talm, TalmSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("KUBECONFIG", "/kube/spoke"),
            ("KUBECONFIG_HUB", ""),
            ("BMC_HOSTS", "10.0.0.1,10.0.0.2"),
            ("REPORT_DIR_NAME", "/out"),
        ]);

        let mut settings = Settings::default();
        settings.clusters.hub_kubeconfig = Some(PathBuf::from("/kube/hub"));
        settings.apply_env_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.clusters.hub_kubeconfig, Some(PathBuf::from("/kube/hub")));
        assert_eq!(settings.clusters.spoke1_kubeconfig, Some(PathBuf::from("/kube/spoke")));
        assert_eq!(settings.clusters.spoke2_kubeconfig, None);
        assert_eq!(settings.power.bmc_hosts.as_deref(), Some("10.0.0.1,10.0.0.2"));
        assert_eq!(settings.report.dir, PathBuf::from("/out"));
    }

    #[test]
    fn test_bmc_credentials_required() {
        let mut power = PowerSettings {
            bmc_user: Some("root".to_string()),
            bmc_password: Some("calvin".to_string()),
            ..Default::default()
        };
        let err = power.bmc_credentials().unwrap_err();
        assert!(err.to_string().starts_with("BMC_HOSTS is not set"));

        power.bmc_hosts = Some("10.0.0.1".to_string());
        assert_eq!(power.bmc_credentials().unwrap(), ("root", "calvin", "10.0.0.1"));
    }

    #[test]
    fn test_save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.talm.version = Some("4.11".to_string());
        settings.save(&path).unwrap();

        assert_eq!(Settings::load_from_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[power\n").unwrap();

        let err = Settings::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_example_config() {
        let example = Settings::example_config().unwrap();
        assert!(example.contains("ztp-e2e configuration"));
        assert!(example.contains("[talm]"));
        assert!(example.contains("[power]"));
    }
}
