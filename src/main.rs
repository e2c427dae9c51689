use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ha_rancher_rke2::bootstrap::{
    BootstrapTiming, ClusterBootstrapper, FleetCoordinator, FleetReport, InstanceSettings,
    InstanceWorkspace, ShellInstallRunner,
};
use ha_rancher_rke2::config::{ToolConfig, DEFAULT_CONFIG_FILE};
use ha_rancher_rke2::provision::{Provisioner, Terraform};
use ha_rancher_rke2::remote::SshExecutor;
use ha_rancher_rke2::cluster_status::NodeSummary;
use ha_rancher_rke2::{cluster_status, teardown, telemetry};
use serde::Serialize;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the tool configuration file
    #[arg(long, short, env = "HA_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Log output format
    #[arg(long, env = "HA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Also selects how run reports are printed
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision infrastructure and bootstrap every HA instance
    Setup(PathArgs),
    /// Bootstrap HA instances on already provisioned infrastructure
    Bootstrap(BootstrapArgs),
    /// Destroy infrastructure and remove generated files
    Teardown(PathArgs),
    /// Report node readiness for every bootstrapped instance
    Status(PathArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct PathArgs {
    /// Terraform module directory
    #[arg(long, env = "HA_MODULE_DIR", default_value = "modules/aws")]
    module_dir: PathBuf,

    /// Directory under which high-availability-<n>/ workspaces are created
    #[arg(long, env = "HA_WORKSPACE_ROOT", default_value = ".")]
    workspace_root: PathBuf,
}

#[derive(Parser, Debug)]
struct BootstrapArgs {
    #[command(flatten)]
    paths: PathArgs,

    /// Read the flat outputs from a JSON file instead of terraform
    #[arg(long)]
    outputs: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Commands::Version = args.command {
        println!("ha-rancher v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_tracing(args.log_format);

    let result = match args.command {
        Commands::Setup(paths) => run_setup(&args.config, paths, args.log_format).await,
        Commands::Bootstrap(bootstrap) => {
            run_bootstrap(&args.config, bootstrap, args.log_format).await
        }
        Commands::Teardown(paths) => run_teardown(&args.config, paths).await,
        Commands::Status(paths) => run_status(&args.config, paths, args.log_format).await,
        Commands::Version => Ok(()),
    };

    // Flush any remaining traces
    telemetry::shutdown_telemetry();

    result
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let (text_layer, json_layer) = match format {
        LogFormat::Text => (Some(fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_target(true))),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer);

    // Only enable OTEL if an endpoint is provided
    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let otel_layer = telemetry::init_telemetry(&registry);
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
    }
}

/// Resolve `path` against the current directory without requiring it to exist
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    Ok(cwd.join(path))
}

fn load_config(path: &Path) -> Result<ToolConfig> {
    ToolConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn terraform(config: &ToolConfig, paths: &PathArgs) -> Result<Terraform> {
    Ok(Terraform::new(
        absolute(&paths.module_dir)?,
        config.tf_vars.clone(),
        config.total_has,
    ))
}

async fn run_setup(config_path: &Path, paths: PathArgs, format: LogFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let terraform = terraform(&config, &paths)?;

    terraform.apply().await.context("terraform apply failed")?;
    let outputs = terraform.outputs().await?;

    run_fleet(&config, &paths, outputs, format).await
}

async fn run_bootstrap(config_path: &Path, args: BootstrapArgs, format: LogFormat) -> Result<()> {
    let config = load_config(config_path)?;

    let outputs = match &args.outputs {
        Some(file) => {
            let raw = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            ha_rancher_rke2::provision::terraform::parse_flat_outputs(&raw)?
        }
        None => terraform(&config, &args.paths)?.outputs().await?,
    };

    run_fleet(&config, &args.paths, outputs, format).await
}

async fn run_fleet(
    config: &ToolConfig,
    paths: &PathArgs,
    outputs: HashMap<String, String>,
    format: LogFormat,
) -> Result<()> {
    let executor = SshExecutor::new(config.aws.ssh_user.clone(), &config.aws.rsa_private_key)?;
    let bootstrapper = ClusterBootstrapper::new(
        Arc::new(executor),
        Arc::new(ShellInstallRunner),
        InstanceSettings {
            workspace_root: absolute(&paths.workspace_root)?,
            rke2_version: config.k8s.version.clone(),
            timing: BootstrapTiming::default(),
        },
    );
    let fleet = FleetCoordinator::new(
        Arc::new(bootstrapper),
        config.total_has,
        config.rancher.helm_commands.clone(),
    );

    let report = fleet.run(outputs).await?;
    if format == LogFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &FleetReport) {
    let elapsed = report.finished_at - report.started_at;
    println!(
        "Bootstrapped {} HA instance(s) in {}s",
        report.instances.len(),
        elapsed.num_seconds()
    );
    for instance in &report.instances {
        println!("HA {}:", instance.instance);
        println!("  Load balancer: {}", instance.load_balancer_dns);
        println!("  Rancher URL:   https://{}", instance.rancher_url);
        match &instance.kubeconfig {
            Some(path) => println!("  Kubeconfig:    {}", path.display()),
            None => println!("  Kubeconfig:    <not saved>"),
        }
    }
}

async fn run_teardown(config_path: &Path, paths: PathArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let terraform = terraform(&config, &paths)?;

    let report = teardown::teardown(
        &terraform,
        &absolute(&paths.workspace_root)?,
        terraform.module_dir(),
        config.total_has,
    )
    .await?;

    println!("Removed {} path(s)", report.removed.len());
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

/// One line of `status --log-format json` output
#[derive(Debug, Serialize)]
struct InstanceStatus {
    instance: usize,
    /// Absent when no kubeconfig was saved or the cluster was unreachable
    nodes: Option<NodeSummary>,
    all_ready: bool,
}

async fn run_status(config_path: &Path, paths: PathArgs, format: LogFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let root = absolute(&paths.workspace_root)?;

    for instance in 1..=config.total_has {
        let kubeconfig = InstanceWorkspace::new(&root, instance).kubeconfig_path();
        let nodes = if !kubeconfig.exists() {
            if format == LogFormat::Text {
                println!("HA {instance}: no kubeconfig at {}", kubeconfig.display());
            }
            None
        } else {
            match cluster_status::check_instance(&kubeconfig).await {
                Ok(summary) => {
                    if !summary.all_ready() {
                        warn!(
                            "HA {} has {} of {} node(s) Ready",
                            instance, summary.ready, summary.total
                        );
                    }
                    if format == LogFormat::Text {
                        println!(
                            "HA {instance}: {}/{} node(s) Ready",
                            summary.ready, summary.total
                        );
                    }
                    Some(summary)
                }
                Err(e) => {
                    warn!("HA {} status check failed: {}", instance, e.chain());
                    if format == LogFormat::Text {
                        println!("HA {instance}: unreachable");
                    }
                    None
                }
            }
        };

        if format == LogFormat::Json {
            let status = InstanceStatus {
                instance,
                all_ready: nodes.as_ref().is_some_and(NodeSummary::all_ready),
                nodes,
            };
            println!("{}", serde_json::to_string(&status)?);
        }
    }
    Ok(())
}
