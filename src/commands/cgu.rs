//! ClusterGroupUpgrade commands

use anyhow::{Context, Result};
use std::time::Duration;

use super::{ClusterRole, connect};
use crate::config::Settings;
use crate::k8s::environment::{TALM_OPERATOR_NAME, TALM_OPERATOR_NAMESPACE};
use crate::k8s::openshift::get_operator_version_from_csv;
use crate::talm::{Talm, cgu_definition, validate_cgu};
use crate::utils::progress::with_wait_progress;
use crate::wait::{ConditionStatus, ExpectedCondition};

/// Options for `cgu wait`
pub struct CguWaitOptions {
    pub name: String,
    pub namespace: Option<String>,
    pub condition_type: String,
    pub status: Option<ConditionStatus>,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub timeout: Option<Duration>,
}

impl CguWaitOptions {
    pub fn expected(&self) -> ExpectedCondition {
        let mut expected = ExpectedCondition::new(&self.condition_type);
        if let Some(status) = self.status {
            expected = expected.with_status(status);
        }
        if let Some(reason) = &self.reason {
            expected = expected.with_reason(reason);
        }
        if let Some(message) = &self.message {
            expected = expected.with_message_containing(message);
        }
        expected
    }
}

/// Options for `cgu render`
pub struct CguRenderOptions {
    pub name: String,
    pub namespace: Option<String>,
    pub clusters: Vec<String>,
    pub canaries: Vec<String>,
    pub policies: Vec<String>,
    pub max_concurrency: u32,
    pub timeout_minutes: u32,
}

/// TALM helper for the hub, with the version taken from config or the hub itself
async fn hub_talm(settings: &Settings) -> Result<Talm> {
    let hub = connect(&settings.clusters, ClusterRole::Hub).await?;

    let version = match &settings.talm.version {
        Some(version) => version.clone(),
        None => get_operator_version_from_csv(
            hub.client.clone(),
            TALM_OPERATOR_NAME,
            TALM_OPERATOR_NAMESPACE,
        )
        .await
        .context("Failed to read TALM version from the hub")?,
    };
    crate::log_info!("cluster '{}' has TALM version '{}'", hub.name, version);

    Ok(Talm::new(hub.client, &version)?.with_poll_interval(settings.talm.poll_interval()))
}

pub async fn wait(settings: &Settings, opts: CguWaitOptions) -> Result<()> {
    let talm = hub_talm(settings).await?;
    let namespace = opts.namespace.as_deref().unwrap_or(&settings.talm.namespace);
    let timeout = opts.timeout.unwrap_or(settings.talm.timeout());
    let expected = opts.expected();

    let resource = format!("cgu {}/{}", namespace, opts.name);
    with_wait_progress(
        &resource,
        &opts.condition_type,
        talm.wait_for_cgu_in_condition(&opts.name, namespace, &expected, timeout),
    )
    .await?;

    crate::log_info!("CGU {} reached condition {}", resource, opts.condition_type);
    Ok(())
}

pub async fn wait_finished(
    settings: &Settings,
    name: &str,
    namespace: Option<&str>,
    timeout: Option<Duration>,
) -> Result<()> {
    let talm = hub_talm(settings).await?;
    let namespace = namespace.unwrap_or(&settings.talm.namespace);
    let timeout = timeout.unwrap_or(settings.talm.timeout());

    let resource = format!("cgu {}/{}", namespace, name);
    with_wait_progress(
        &resource,
        &talm.vocabulary().completed_type,
        talm.wait_for_cgu_to_finish_successfully(name, namespace, timeout),
    )
    .await?;

    crate::log_info!("CGU {} finished successfully", resource);
    Ok(())
}

/// Validated CGU manifest as YAML
pub fn render(settings: &Settings, opts: CguRenderOptions) -> Result<String> {
    let namespace = opts.namespace.as_deref().unwrap_or(&settings.talm.namespace);
    let cgu = cgu_definition(
        &opts.name,
        namespace,
        opts.clusters,
        opts.canaries,
        opts.policies,
        opts.max_concurrency,
        opts.timeout_minutes,
    );
    validate_cgu(&cgu)?;

    serde_yaml::to_string(&cgu).context("Failed to serialize CGU")
}
