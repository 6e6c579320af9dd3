//! Show the clusters and operator versions a test run would use

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::k8s::{ClusterEnvironment, ClusterHandle};
use crate::utils::progress::create_spinner;

pub async fn show(settings: &Settings) -> Result<()> {
    crate::log_info!("Discovering cluster environment...");

    let spinner = create_spinner("Connecting to clusters");
    let discovered = ClusterEnvironment::discover(&settings.clusters).await;
    spinner.finish_and_clear();
    let env = discovered.context("Failed to discover cluster environment")?;

    print!("{}", render(&env));
    Ok(())
}

fn render(env: &ClusterEnvironment) -> String {
    let cluster_line = |role: &str, handle: &Option<ClusterHandle>| match handle {
        Some(c) => format!("  {:<8} {} (OCP {})\n", role, c.name, c.ocp_version),
        None => format!("  {:<8} not configured\n", role),
    };
    let version = |v: &str| if v.is_empty() { "unknown".to_string() } else { v.to_string() };

    let mut out = String::from("Clusters:\n");
    out.push_str(&cluster_line("hub", &env.hub));
    out.push_str(&cluster_line("spoke1", &env.spoke1));
    out.push_str(&cluster_line("spoke2", &env.spoke2));

    if env.hub.is_some() {
        out.push_str("Hub operators:\n");
        out.push_str(&format!("  {:<8} {}\n", "TALM", version(&env.talm_version)));
        out.push_str(&format!("  {:<8} {}\n", "ZTP", version(&env.ztp_version)));
        out.push_str(&format!("  {:<8} {}\n", "ACM", version(&env.acm_version)));
    }

    out
}
