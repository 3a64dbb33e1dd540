//! meshcheck - verify a service mesh installation against its manifest

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use meshcheck::config::VerifyConfig;
use meshcheck::probe::KubeResourceProbe;
use meshcheck::reconcile::{FailureMode, KindRegistry, ManifestDiffer};
use meshcheck::retry::RetryPolicy;
use meshcheck::status::{check_install_status, InstallStatusReport};
use meshcheck::telemetry::{init_tracing, LogFormat, TelemetryConfig};
use meshcheck::verify::Verifier;

/// meshcheck - installation verification and reconciliation
#[derive(Parser, Debug)]
#[command(name = "meshcheck", version, about, long_about = None)]
struct Cli {
    /// Path to kubeconfig (falls back to in-cluster / default config)
    #[arg(long, global = true, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Settings file (YAML or JSON)
    #[arg(long, global = true, env = "MESHCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check install status, pod readiness and the manifest against the cluster
    Verify(VerifyArgs),

    /// Poll until the installer reports itself healthy
    Status(TargetArgs),

    /// Check that every object in a manifest exists in the cluster
    Reconcile(ReconcileArgs),

    /// Decode and aggregate a saved status document without a cluster
    CheckStatus(CheckStatusArgs),

    /// List the kinds that reconciliation checks
    Kinds,
}

/// Flags that locate the installation
#[derive(Args, Debug, Default)]
struct TargetArgs {
    /// Name of the installer's custom resource
    #[arg(long)]
    install_name: Option<String>,

    /// Control-plane namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Namespace the operator runs in
    #[arg(long)]
    operator_namespace: Option<String>,

    /// Status check timeout in seconds
    #[arg(long)]
    status_timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Generated manifest to verify
    #[arg(short = 'f', long)]
    manifest: PathBuf,

    /// Per-object timeout in seconds
    #[arg(long)]
    object_timeout_secs: Option<u64>,

    /// Stop at the first missing object or report all of them
    #[arg(long, value_enum)]
    failure_mode: Option<FailureMode>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[command(flatten)]
    reconcile: ReconcileArgs,

    /// Skip waiting for control-plane pods
    #[arg(long)]
    skip_pods: bool,
}

#[derive(Args, Debug)]
struct CheckStatusArgs {
    /// Status document (YAML or JSON)
    #[arg(short = 'f', long)]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(TelemetryConfig {
        format: cli.log_format,
        ..Default::default()
    })?;

    let mut config = match &cli.config {
        Some(path) => VerifyConfig::from_file(path)?,
        None => VerifyConfig::default(),
    };

    match cli.command {
        Commands::Verify(args) => {
            apply_target(&mut config, &args.target);
            apply_reconcile(&mut config, &args.reconcile);
            if args.skip_pods {
                config.check_pods = false;
            }
            run_verify(cli.kubeconfig.as_deref(), config, &args.reconcile.manifest).await
        }
        Commands::Status(args) => {
            apply_target(&mut config, &args);
            run_status(cli.kubeconfig.as_deref(), config).await
        }
        Commands::Reconcile(args) => {
            apply_reconcile(&mut config, &args);
            run_reconcile(cli.kubeconfig.as_deref(), config, &args.manifest).await
        }
        Commands::CheckStatus(args) => run_check_status(&args.file).await,
        Commands::Kinds => {
            for kind in KindRegistry::with_default_kinds().registered_kinds() {
                println!("{}", kind);
            }
            Ok(())
        }
    }
}

fn apply_target(config: &mut VerifyConfig, args: &TargetArgs) {
    if let Some(name) = &args.install_name {
        config.install_name = name.clone();
    }
    if let Some(ns) = &args.namespace {
        config.control_plane_namespace = ns.clone();
    }
    if let Some(ns) = &args.operator_namespace {
        config.operator_namespace = ns.clone();
    }
    if let Some(secs) = args.status_timeout_secs {
        config.status_policy = RetryPolicy::new(Duration::from_secs(secs), config.status_policy.delay);
    }
}

fn apply_reconcile(config: &mut VerifyConfig, args: &ReconcileArgs) {
    if let Some(secs) = args.object_timeout_secs {
        config.object_policy = RetryPolicy::new(Duration::from_secs(secs), config.object_policy.delay);
    }
    if let Some(mode) = args.failure_mode {
        config.failure_mode = mode;
    }
}

async fn read_manifest(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read manifest {:?}: {}", path, e))
}

async fn run_verify(
    kubeconfig: Option<&Path>,
    config: VerifyConfig,
    manifest_path: &Path,
) -> anyhow::Result<()> {
    let manifest = read_manifest(manifest_path).await?;
    let verifier = Verifier::new(config)?;
    let probe = KubeResourceProbe::connect(kubeconfig).await?;

    let report = verifier.run(&probe, &manifest).await?;

    println!("=== installation verified ===");
    println!("Components healthy: {}", report.status.components().len());
    if let Some(pods) = report.ready_pods {
        println!("Control-plane pods ready: {}", pods);
    }
    print_reconcile_summary(&report.reconcile);
    Ok(())
}

async fn run_status(kubeconfig: Option<&Path>, config: VerifyConfig) -> anyhow::Result<()> {
    config.validate()?;
    let probe = KubeResourceProbe::connect(kubeconfig).await?;
    let report = check_install_status(&probe, &config).await?;

    println!("Install status: {}", report.status());
    for (name, component) in report.components() {
        println!("  {}: {}", name, component.status);
    }
    Ok(())
}

async fn run_reconcile(
    kubeconfig: Option<&Path>,
    config: VerifyConfig,
    manifest_path: &Path,
) -> anyhow::Result<()> {
    config.validate()?;
    let manifest = read_manifest(manifest_path).await?;
    let probe = KubeResourceProbe::connect(kubeconfig).await?;

    let differ = ManifestDiffer::new(config.object_policy)?.with_failure_mode(config.failure_mode);
    let report = differ.reconcile(&manifest, &probe).await?;
    print_reconcile_summary(&report);
    Ok(())
}

async fn run_check_status(path: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read status file {:?}: {}", path, e))?;
    let report = InstallStatusReport::from_yaml_str(&content)?;
    let unhealthy = report.aggregate();

    if unhealthy.is_empty() {
        println!("Install status healthy ({} components)", report.components().len());
        return Ok(());
    }
    for entity in unhealthy.iter() {
        println!("  - {}", entity);
    }
    anyhow::bail!("{} unhealthy entities", unhealthy.len())
}

fn print_reconcile_summary(report: &meshcheck::reconcile::ReconcileReport) {
    println!("Objects verified: {}", report.verified.len());
    if !report.skipped.is_empty() {
        println!("Objects not checked (no lookup for kind):");
        for object in &report.skipped {
            println!("  - {}", object);
        }
    }
}
