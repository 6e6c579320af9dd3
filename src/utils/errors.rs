//! Enhanced error types with actionable suggestions

use colored::Colorize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::gitops::GitopsError;
use crate::power::PowerError;
use crate::talm::TalmError;
use crate::version::VersionError;
use crate::wait::WaitError;

/// Enhanced error with suggestions and documentation links
#[derive(Error, Debug)]
#[error("{message}")]
pub struct E2eError {
    pub message: String,
    pub suggestions: Vec<String>,
    pub docs_link: Option<String>,
}

impl E2eError {
    /// Create a new error with suggestions
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
            docs_link: None,
        }
    }

    /// Add a suggestion to the error
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a documentation link
    pub fn with_docs(mut self, link: impl Into<String>) -> Self {
        self.docs_link = Some(link.into());
        self
    }

    /// Display the error with suggestions
    pub fn display(&self) {
        crate::log_error!("{}", self.message);

        if !self.suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggestions:".yellow().bold());
            for suggestion in &self.suggestions {
                eprintln!("  {} {}", "→".blue(), suggestion);
            }
        }

        if let Some(docs) = &self.docs_link {
            eprintln!();
            eprintln!("{} {}", "Documentation:".cyan(), docs);
        }
    }

    // Common error patterns

    /// Kubeconfig environment variable not set
    pub fn kubeconfig_env_missing(env_var: &str) -> Self {
        Self::new(format!("Can not load api client, {} is not set", env_var))
            .suggest(format!("Export {}=/path/to/kubeconfig", env_var))
            .suggest("Or set the path in the [clusters] section of the config file")
    }

    /// Required cluster was not configured
    pub fn cluster_not_configured(role: &str) -> Self {
        Self::new(format!("The {} cluster is not configured", role))
            .suggest("Run 'ztp-e2e env' to see which clusters were discovered")
            .suggest("KUBECONFIG_HUB selects the hub, KUBECONFIG spoke1 and KUBECONFIG_SPOKE2 spoke2")
    }

    /// Wait ended without the expected state
    pub fn wait_failed(resource: &str, reason: &str) -> Self {
        Self::new(format!("Waiting for {} failed: {}", resource, reason))
            .suggest("The message above is the last state observed before the deadline")
            .suggest("Increase the timeout with --timeout if the operator is slow to reconcile")
            .suggest(format!("Inspect the resource with: oc get {} -o yaml", resource))
    }

    /// Bad version bound passed by test setup
    pub fn invalid_version_bound(bound: &str) -> Self {
        Self::new(format!("Invalid version bound '{}'", bound))
            .suggest("Bounds must be empty or dot separated integers such as 4.12")
    }

    /// BMC hosts missing for power sampling
    pub fn bmc_hosts_missing() -> Self {
        Self::new("No BMC hosts configured")
            .suggest("Please set BMC_HOSTS environment variable")
            .suggest("Also set BMC_USER and BMC_PASSWORD for ipmitool")
    }

    /// Sampling produced nothing
    pub fn no_power_metrics(node: &str) -> Self {
        Self::new(format!("No power usage metrics were retrieved from {}", node))
            .suggest("Verify ipmitool exists in the privileged pod on the node")
            .suggest("Check BMC credentials with: ipmitool -I lanplus -H <bmc> -U <user> -P <pass> dcmi power reading")
    }

    /// Tool not found error
    pub fn tool_not_found(tool: &str, install_hint: &str) -> Self {
        Self::new(format!("Required tool '{}' not found", tool))
            .suggest(format!("Install with: {}", install_hint))
            .suggest("Ensure the tool is in your PATH")
    }

    /// Permission denied error
    pub fn permission_denied(operation: &str) -> Self {
        Self::new(format!("Permission denied: {}", operation))
            .suggest("Verify you have sufficient cluster permissions")
            .suggest("Check if you need cluster-admin role")
    }

    /// Connection timeout error
    pub fn connection_timeout(resource: &str) -> Self {
        Self::new(format!("Timeout waiting for {}", resource))
            .suggest("Check if the cluster is healthy")
            .suggest("Verify network connectivity to the API server")
    }
}

/// Helper to display error and exit
pub fn display_error_and_exit(error: E2eError) -> ! {
    error.display();
    std::process::exit(1);
}

/// Convert anyhow error to E2eError when possible
pub fn enhance_error(err: anyhow::Error) -> E2eError {
    let err = match err.downcast::<E2eError>() {
        Ok(e2e) => return e2e,
        Err(err) => err,
    };

    if let Some(VersionError::InvalidBound { bound }) = version_error(&err) {
        return E2eError::invalid_version_bound(bound);
    }

    if let Some(PowerError::MissingBmcHosts) = err.downcast_ref::<PowerError>() {
        return E2eError::bmc_hosts_missing();
    }

    if let Some(ConfigError::Missing {
        name: "BMC_HOSTS", ..
    }) = err.downcast_ref::<ConfigError>()
    {
        return E2eError::bmc_hosts_missing();
    }

    if let Some(PowerError::NoMetrics { node }) = err.downcast_ref::<PowerError>() {
        return E2eError::no_power_metrics(node);
    }

    if let Some(WaitError::Unsatisfied { resource, mismatch }) = wait_error(&err) {
        return E2eError::wait_failed(resource, &mismatch.to_string());
    }

    let err_str = format!("{:#}", err);

    if err_str.contains("connection refused") || err_str.contains("timed out") {
        return E2eError::connection_timeout("cluster");
    }

    if err_str.contains("Unauthorized") || err_str.contains("forbidden") {
        return E2eError::permission_denied("cluster operation");
    }

    // Default error with generic suggestion
    E2eError::new(err_str)
        .suggest("Run with -vv for more details")
        .suggest("Check logs for additional context")
}

// Module errors wrap these transparently, so they are not reachable through `source()`
fn wait_error(err: &anyhow::Error) -> Option<&WaitError> {
    err.downcast_ref::<WaitError>()
        .or_else(|| match err.downcast_ref::<TalmError>() {
            Some(TalmError::Wait(e)) => Some(e),
            _ => None,
        })
        .or_else(|| match err.downcast_ref::<GitopsError>() {
            Some(GitopsError::Wait(e)) => Some(e),
            _ => None,
        })
}

fn version_error(err: &anyhow::Error) -> Option<&VersionError> {
    err.downcast_ref::<VersionError>()
        .or_else(|| match err.downcast_ref::<TalmError>() {
            Some(TalmError::Version(e)) => Some(e),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::Mismatch;

    #[test]
    fn test_kubeconfig_env_missing_error() {
        let err = E2eError::kubeconfig_env_missing("KUBECONFIG_HUB");
        assert!(err.message.contains("KUBECONFIG_HUB"));
        assert_eq!(err.suggestions.len(), 2);
    }

    #[test]
    fn test_error_with_docs() {
        let err = E2eError::new("test error").with_docs("https://example.com");
        assert!(err.docs_link.is_some());
    }

    #[test]
    fn test_enhance_invalid_bound() {
        let err = anyhow::Error::new(VersionError::InvalidBound {
            bound: "abc".to_string(),
        });
        let enhanced = enhance_error(err);
        assert!(enhanced.message.contains("'abc'"));
    }

    #[test]
    fn test_enhance_wait_keeps_last_mismatch() {
        let err = anyhow::Error::new(WaitError::Unsatisfied {
            resource: "clustergroupupgrade ztp-install/talm-cgu".to_string(),
            mismatch: Mismatch::TypeNotPresent {
                condition_type: "Succeeded".to_string(),
            },
        });
        let enhanced = enhance_error(err);
        assert!(enhanced.message.contains("condition for type 'Succeeded' was not present"));
        assert_eq!(enhanced.suggestions.len(), 3);
    }

    #[test]
    fn test_enhance_wait_inside_talm_error() {
        let err = anyhow::Error::new(TalmError::Wait(WaitError::Unsatisfied {
            resource: "clustergroupupgrade ztp-install/talm-cgu".to_string(),
            mismatch: Mismatch::Other("cluster spoke1 not in progress".to_string()),
        }))
        .context("cgu wait failed");
        let enhanced = enhance_error(err);
        assert!(enhanced.message.starts_with("Waiting for clustergroupupgrade ztp-install/talm-cgu failed"));
    }

    #[test]
    fn test_enhance_missing_bmc_hosts_setting() {
        let err = anyhow::Error::new(ConfigError::Missing {
            name: "BMC_HOSTS",
            section: "power",
        });
        assert_eq!(enhance_error(err).message, "No BMC hosts configured");
    }

    #[test]
    fn test_enhance_generic() {
        let enhanced = enhance_error(anyhow::anyhow!("something odd"));
        assert_eq!(enhanced.message, "something odd");
    }
}
