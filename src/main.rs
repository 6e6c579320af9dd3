//! ztp-e2e CLI - end-to-end helpers for ZTP, TALM and power management

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use ztp_e2e::commands::{self, ClusterRole};
use ztp_e2e::config::Settings;
use ztp_e2e::utils::{display_error_and_exit, enhance_error, logger};
use ztp_e2e::wait::ConditionStatus;

#[derive(Parser)]
#[command(name = "ztp-e2e")]
#[command(author, version, about = "End-to-end helpers for ZTP, TALM and power management", long_about = None)]
struct Cli {
    /// Verbose output (can be used multiple times: -v, -vv, -vvv)
    /// -v: INFO, -vv: DEBUG, -vvv: TRACE
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a config file (default: .ztp-e2e.toml or ~/.config/ztp-e2e/config.toml)
    #[arg(long, global = true, env = "ZTP_E2E_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show discovered clusters and operator versions
    Env,

    /// Work with ClusterGroupUpgrades on the hub
    Cgu {
        #[command(subcommand)]
        command: CguCommands,
    },

    /// Measure and inspect node power usage
    Power {
        #[command(subcommand)]
        command: PowerCommands,
    },

    /// Inspect and repoint Argo CD applications on the hub
    Argocd {
        #[command(subcommand)]
        command: ArgocdCommands,
    },

    /// Run operations on cluster nodes
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Drive and validate image based upgrades of single node clusters
    Ibu {
        #[command(subcommand)]
        command: IbuCommands,
    },

    /// Check whether a version lies within a range (exit code 1 when it does not)
    VersionCheck {
        /// Version to check, e.g. 4.12.3
        version: String,

        /// Inclusive minimum major.minor, empty for none
        #[arg(long, default_value = "")]
        min: String,

        /// Inclusive maximum major.minor, empty for none
        #[arg(long, default_value = "")]
        max: String,
    },

    /// Check prerequisites
    Check {
        /// Also check for the OpenShift CLI
        #[arg(long)]
        openshift: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CguCommands {
    /// Wait for a CGU condition
    Wait {
        /// CGU name
        name: String,

        /// CGU namespace (default from config, talm-test)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Condition type, e.g. Succeeded
        #[arg(long = "type")]
        condition_type: String,

        /// Expected condition status
        #[arg(long)]
        status: Option<ConditionStatus>,

        /// Expected condition reason
        #[arg(long)]
        reason: Option<String>,

        /// Text the condition message must contain
        #[arg(long)]
        message: Option<String>,

        /// Timeout such as 30s, 10m or 1h
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Wait for a CGU to complete, using the condition names of the hub's TALM version
    WaitFinished {
        /// CGU name
        name: String,

        /// CGU namespace (default from config, talm-test)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Timeout such as 30s, 10m or 1h
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Print a validated CGU manifest
    Render {
        /// CGU name
        name: String,

        /// CGU namespace (default from config, talm-test)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Clusters to remediate (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        clusters: Vec<String>,

        /// Canary clusters (comma-separated)
        #[arg(long, value_delimiter = ',')]
        canaries: Vec<String>,

        /// Managed policies (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        policies: Vec<String>,

        /// Clusters remediated in parallel
        #[arg(long, default_value_t = 1)]
        max_concurrency: u32,

        /// Remediation timeout in minutes
        #[arg(long, default_value_t = 240)]
        timeout_minutes: u32,
    },
}

#[derive(Subcommand)]
enum PowerCommands {
    /// Sample power usage through the node's BMC and write a metrics report
    Collect {
        /// Cluster the node belongs to
        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,

        /// Node to sample (default: the only node of an SNO cluster)
        #[arg(long)]
        node: Option<String>,

        /// Sampling duration such as 5m
        #[arg(long, value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Sampling interval such as 30s
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,

        /// Scenario name used in metric names
        #[arg(long)]
        scenario: Option<String>,

        /// Tag used in metric names (default: the configured power state)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Parse `ipmitool dcmi power reading` output from a file or stdin
    Parse {
        /// Input file (default: stdin)
        file: Option<PathBuf>,
    },

    /// Show the power state configured by the performance profile
    State {
        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,
    },

    /// Set the power state through the performance profile workload hints
    SetMode {
        /// performance, highperformance or powersaving
        mode: String,

        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,

        /// Time allowed for the machine config rollout
        #[arg(long, value_parser = parse_duration, default_value = "30m")]
        timeout: Duration,
    },
}

#[derive(Subcommand)]
enum ArgocdCommands {
    /// Show git details of applications (default: clusters and policies)
    Show {
        apps: Vec<String>,
    },

    /// Point an application at another repo, branch or path
    SetGit {
        /// Application name
        app: String,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        branch: Option<String>,

        #[arg(long)]
        path: Option<String>,

        /// Do not wait for Argo CD to pick up the change
        #[arg(long)]
        no_wait: bool,

        /// Require the application to end up Synced
        #[arg(long)]
        require_synced: bool,

        /// Verify the path exists in the git repository first
        #[arg(long)]
        check_path: bool,

        /// Timeout such as 10m
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
}

#[derive(Subcommand)]
enum NodeCommands {
    /// Soft reboot a node
    Reboot {
        node: String,

        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,

        /// Wait up to this long for all nodes to be Ready again
        #[arg(long, value_parser = parse_duration)]
        wait: Option<Duration>,
    },

    /// Run a command on a node through its privileged pod
    Exec {
        node: String,

        /// Command line, split like a shell would
        command: String,

        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,
    },

    /// Check kernel parameters on the node command line
    CheckKernel {
        node: String,

        /// Regex patterns that must match (default: the DU profile parameters)
        #[arg(long = "param")]
        params: Vec<String>,

        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,
    },

    /// Crash the kernel to trigger kdump and wait for the cluster to recover
    Kdump {
        node: String,

        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,

        /// Time allowed for the API server to come back
        #[arg(long, value_parser = parse_duration, default_value = "5m")]
        timeout: Duration,
    },

    /// Check resume latency and frequency governor of CPUs
    CheckCpus {
        node: String,

        /// CPU list such as 2-5,8
        #[arg(long)]
        cpus: String,

        /// Expected pm_qos_resume_latency_us, e.g. 0 or n/a
        #[arg(long, default_value = "0")]
        pm_qos: String,

        /// Expected scaling governor
        #[arg(long, default_value = "performance")]
        governor: String,

        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,
    },
}

#[derive(Subcommand)]
enum IbuCommands {
    /// Move the upgrade to Idle, Prep, Upgrade or Rollback
    SetStage {
        stage: String,

        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,

        /// Wait for the stage to complete
        #[arg(long)]
        wait: bool,

        /// Stage timeout such as 1h (default from config)
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Set the seed image to upgrade to
    SeedImage {
        image: String,

        /// OpenShift version of the seed
        #[arg(long)]
        version: String,

        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,
    },

    /// Print or save version, cluster ID, operators and node name
    ClusterInfo {
        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,

        /// Write the snapshot to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check an upgraded cluster against a snapshot taken before the upgrade
    Validate {
        /// Snapshot written by `ibu cluster-info --output`
        #[arg(long)]
        before: PathBuf,

        /// Fail if pods are still named after this seed node
        #[arg(long)]
        seed_node: Option<String>,

        #[arg(long, value_enum, default_value_t = ClusterRole::Spoke1)]
        cluster: ClusterRole,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logger::init(cli.verbose);

    if let Err(e) = run(cli).await {
        display_error_and_exit(enhance_error(e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config;
    let settings = || Settings::load(config.as_deref());

    match cli.command {
        Commands::Env => commands::env::show(&settings()?).await,
        Commands::Cgu { command } => handle_cgu_command(&settings()?, command).await,
        Commands::Power { command } => handle_power_command(command, settings).await,
        Commands::Argocd { command } => handle_argocd_command(&settings()?, command).await,
        Commands::Node { command } => handle_node_command(&settings()?, command).await,
        Commands::Ibu { command } => handle_ibu_command(&settings()?, command).await,
        Commands::VersionCheck { version, min, max } => {
            handle_version_check_command(&version, &min, &max)
        }
        Commands::Check { openshift } => commands::check::prerequisites(openshift),
        Commands::Completion { shell } => handle_completion_command(shell),
        Commands::Version => handle_version_command(),
    }
}

async fn handle_cgu_command(settings: &Settings, command: CguCommands) -> Result<()> {
    use ztp_e2e::commands::cgu::{CguRenderOptions, CguWaitOptions};

    match command {
        CguCommands::Wait {
            name,
            namespace,
            condition_type,
            status,
            reason,
            message,
            timeout,
        } => {
            commands::cgu::wait(
                settings,
                CguWaitOptions {
                    name,
                    namespace,
                    condition_type,
                    status,
                    reason,
                    message,
                    timeout,
                },
            )
            .await
        }
        CguCommands::WaitFinished {
            name,
            namespace,
            timeout,
        } => commands::cgu::wait_finished(settings, &name, namespace.as_deref(), timeout).await,
        CguCommands::Render {
            name,
            namespace,
            clusters,
            canaries,
            policies,
            max_concurrency,
            timeout_minutes,
        } => {
            let yaml = commands::cgu::render(
                settings,
                CguRenderOptions {
                    name,
                    namespace,
                    clusters,
                    canaries,
                    policies,
                    max_concurrency,
                    timeout_minutes,
                },
            )?;
            print!("{}", yaml);
            Ok(())
        }
    }
}

async fn handle_power_command<F>(command: PowerCommands, settings: F) -> Result<()>
where
    F: Fn() -> Result<Settings, ztp_e2e::config::ConfigError>,
{
    match command {
        PowerCommands::Collect {
            cluster,
            node,
            duration,
            interval,
            scenario,
            tag,
        } => {
            use ztp_e2e::commands::power::CollectOptions;
            commands::power::collect(
                &settings()?,
                CollectOptions {
                    cluster,
                    node,
                    duration,
                    interval,
                    scenario,
                    tag,
                },
            )
            .await
        }
        PowerCommands::Parse { file } => commands::power::parse(file),
        PowerCommands::State { cluster } => commands::power::state(&settings()?, cluster).await,
        PowerCommands::SetMode {
            mode,
            cluster,
            timeout,
        } => commands::power::set_mode(&settings()?, cluster, &mode, timeout).await,
    }
}

async fn handle_argocd_command(settings: &Settings, command: ArgocdCommands) -> Result<()> {
    match command {
        ArgocdCommands::Show { apps } => commands::argocd::show(settings, apps).await,
        ArgocdCommands::SetGit {
            app,
            repo,
            branch,
            path,
            no_wait,
            require_synced,
            check_path,
            timeout,
        } => {
            use ztp_e2e::commands::argocd::SetGitOptions;
            commands::argocd::set_git(
                settings,
                SetGitOptions {
                    app,
                    repo,
                    branch,
                    path,
                    no_wait,
                    require_synced,
                    check_path,
                    timeout,
                },
            )
            .await
        }
    }
}

async fn handle_node_command(settings: &Settings, command: NodeCommands) -> Result<()> {
    match command {
        NodeCommands::Reboot {
            node,
            cluster,
            wait,
        } => commands::node::reboot(settings, cluster, &node, wait).await,
        NodeCommands::Exec {
            node,
            command,
            cluster,
        } => commands::node::exec(settings, cluster, &node, &command).await,
        NodeCommands::CheckKernel {
            node,
            params,
            cluster,
        } => commands::node::check_kernel(settings, cluster, &node, params).await,
        NodeCommands::CheckCpus {
            node,
            cpus,
            pm_qos,
            governor,
            cluster,
        } => commands::node::check_cpus(settings, cluster, &node, &cpus, &pm_qos, &governor).await,
        NodeCommands::Kdump {
            node,
            cluster,
            timeout,
        } => commands::node::kdump(settings, cluster, &node, timeout).await,
    }
}

async fn handle_ibu_command(settings: &Settings, command: IbuCommands) -> Result<()> {
    match command {
        IbuCommands::SetStage {
            stage,
            cluster,
            wait,
            timeout,
        } => commands::ibu::set_stage(settings, cluster, &stage, wait, timeout).await,
        IbuCommands::SeedImage {
            image,
            version,
            cluster,
        } => commands::ibu::set_seed_image(settings, cluster, &image, &version).await,
        IbuCommands::ClusterInfo { cluster, output } => {
            commands::ibu::cluster_info(settings, cluster, output.as_deref()).await
        }
        IbuCommands::Validate {
            before,
            seed_node,
            cluster,
        } => commands::ibu::validate(settings, cluster, &before, seed_node.as_deref()).await,
    }
}

fn handle_version_check_command(version: &str, min: &str, max: &str) -> Result<()> {
    if !commands::check::version_in_range(version, min, max)? {
        std::process::exit(1);
    }
    Ok(())
}

fn handle_completion_command(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "ztp-e2e", &mut io::stdout());
    Ok(())
}

fn handle_version_command() -> Result<()> {
    println!("ztp-e2e {}", env!("CARGO_PKG_VERSION"));
    println!("End-to-end helpers for ZTP, TALM and power management");
    Ok(())
}

/// Parse `90`, `30s`, `10m` or `1h`; a bare number is seconds
fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    let (digits, unit) = match input.find(|c: char| !c.is_ascii_digit()) {
        Some(index) => input.split_at(index),
        None => (input, "s"),
    };

    let value: u64 = match digits.parse() {
        Ok(value) => value,
        Err(_) => bail!("invalid duration '{}'", input),
    };

    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => bail!("invalid duration unit in '{}', use s, m or h", input),
    };

    match value.checked_mul(multiplier) {
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => bail!("duration '{}' is too large", input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        let err = parse_duration(&format!("{}h", u64::MAX)).unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert!(parse_duration(&format!("{}m", u64::MAX / 60 + 1)).is_err());
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)).unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
