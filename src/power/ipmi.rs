//! `ipmitool dcmi power reading` output parsing and BMC access details

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::PowerError;

pub const INSTANTANEOUS_POWER: &str = "instantaneousPower";
pub const MIN_POWER: &str = "minPower";
pub const MAX_POWER: &str = "maxPower";
pub const AVG_POWER: &str = "avgPower";

/// Named readings in watts
pub type PowerReadings = BTreeMap<String, f64>;

static READING_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (INSTANTANEOUS_POWER, r"Instantaneous power reading: (\s*[0-9]+) Watts"),
        (MIN_POWER, r"Minimum during sampling period: (\s*[0-9]+) Watts"),
        (MAX_POWER, r"Maximum during sampling period: (\s*[0-9]+) Watts"),
        (AVG_POWER, r"Average power reading over sample period: (\s*[0-9]+) Watts"),
    ]
    .into_iter()
    .map(|(key, pattern)| (key, Regex::new(pattern).expect("static power reading pattern")))
    .collect()
});

/// Extract the power readings present in the command output.
///
/// Lines that are missing simply leave the reading out.
pub fn parse_ipmi_power_output(output: &str) -> PowerReadings {
    READING_PATTERNS
        .iter()
        .filter_map(|(key, re)| {
            let captures = re.captures(output)?;
            let watts = captures[1].trim().parse::<f64>().ok()?;
            Some((key.to_string(), watts))
        })
        .collect()
}

/// Credentials and addresses of the baseboard management controllers
#[derive(Clone, Debug, PartialEq)]
pub struct BmcInfo {
    pub user: String,
    pub password: String,
    pub hosts: Vec<String>,
}

impl BmcInfo {
    /// Build from a comma separated host list such as `BMC_HOSTS`
    pub fn from_hosts(user: &str, password: &str, hosts: &str) -> Result<Self, PowerError> {
        let hosts: Vec<String> = hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect();

        if hosts.is_empty() {
            return Err(PowerError::MissingBmcHosts);
        }

        if hosts.len() > 1 {
            tracing::warn!("multiple hosts detected, only using {}", hosts[0]);
        }

        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
            hosts,
        })
    }

    /// The host queried for readings; only the first one is used
    pub fn primary_host(&self) -> &str {
        self.hosts.first().map(String::as_str).unwrap_or_default()
    }

    /// argv for one power reading
    pub fn power_reading_command(&self) -> Vec<String> {
        [
            "ipmitool",
            "-I",
            "lanplus",
            "-U",
            self.user.as_str(),
            "-P",
            self.password.as_str(),
            "-H",
            self.primary_host(),
            "dcmi",
            "power",
            "reading",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DCMI_OUTPUT: &str = "
    Instantaneous power reading:                   326 Watts
    Minimum during sampling period:                  8 Watts
    Maximum during sampling period:                503 Watts
    Average power reading over sample period:      251 Watts
    IPMI timestamp:                           Wed Mar  8 15:17:46 2023
    Sampling period:                          00000001 Seconds.
    Power reading state is:                   activated
";

    #[test]
    fn test_parse_all_readings() {
        let readings = parse_ipmi_power_output(DCMI_OUTPUT);
        assert_eq!(readings.len(), 4);
        assert_eq!(readings[INSTANTANEOUS_POWER], 326.0);
        assert_eq!(readings[MIN_POWER], 8.0);
        assert_eq!(readings[MAX_POWER], 503.0);
        assert_eq!(readings[AVG_POWER], 251.0);
    }

    #[test]
    fn test_leading_whitespace_in_value() {
        let readings = parse_ipmi_power_output("Instantaneous power reading:    97 Watts\n");
        assert_eq!(readings.get(INSTANTANEOUS_POWER), Some(&97.0));
    }

    #[test]
    fn test_missing_lines_are_omitted() {
        let readings = parse_ipmi_power_output(
            "Instantaneous power reading: 120 Watts\nAverage power reading over sample period: 110 Watts\n",
        );
        assert_eq!(readings.len(), 2);
        assert!(!readings.contains_key(MIN_POWER));
        assert!(parse_ipmi_power_output("garbage").is_empty());
    }

    #[test]
    fn test_bmc_hosts_split() {
        let bmc = BmcInfo::from_hosts("root", "calvin", "10.0.0.1, 10.0.0.2").unwrap();
        assert_eq!(bmc.hosts, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(bmc.primary_host(), "10.0.0.1");
    }

    #[test]
    fn test_bmc_hosts_empty() {
        assert!(matches!(
            BmcInfo::from_hosts("root", "calvin", ""),
            Err(PowerError::MissingBmcHosts)
        ));
        assert!(BmcInfo::from_hosts("root", "calvin", " , ").is_err());
    }

    #[test]
    fn test_power_reading_command() {
        let bmc = BmcInfo::from_hosts("root", "calvin", "bmc-1").unwrap();
        assert_eq!(
            bmc.power_reading_command().join(" "),
            "ipmitool -I lanplus -U root -P calvin -H bmc-1 dcmi power reading"
        );
    }
}
