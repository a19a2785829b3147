//! KServe Installer daemon
//!
//! Watches `KServeStack` descriptors and converges the cluster onto the
//! KServe serving stack.
//!
//! ## Commands
//!
//! - `run` (default): start the operator loop
//! - `crd`: print the `KServeStack` CustomResourceDefinition
//! - `manifests`: decode the configured bundles offline and list their objects

mod config;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, Level};

use kserve_installer_core::{
    controller, init_tracing, inspect_catalog, DecodedBundle, KubeCluster, LogFormat, Reconciler,
    VERSION,
};

use crate::config::InstallerArgs;

#[derive(Parser)]
#[command(name = "kserve-installerd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Keeps a cluster converged on the KServe serving stack", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    installer: InstallerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch descriptors and reconcile them (default)
    Run,

    /// Print the KServeStack CRD as YAML
    Crd,

    /// Decode every bundle and list its objects in apply order
    Manifests,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_tracing(format, level);
            cmd_run(&cli.installer).await
        }
        Commands::Crd => cmd_crd(),
        Commands::Manifests => cmd_manifests(&cli.installer, cli.json).await,
    }
}

async fn cmd_run(args: &InstallerArgs) -> Result<()> {
    info!(version = VERSION, "starting kserve-installerd");

    let cluster = KubeCluster::try_default()
        .await
        .context("Failed to build Kubernetes client")?;
    let client = cluster.client().clone();
    let cluster = Arc::new(cluster);
    let reconciler = Reconciler::new(cluster, args.catalog(), args.engine_config());

    controller::run(
        client,
        reconciler,
        args.namespace.clone(),
        args.controller_config(),
    )
    .await;

    info!("kserve-installerd stopped");
    Ok(())
}

fn cmd_crd() -> Result<()> {
    let yaml = kserve_stack_api::crd_yaml().context("Failed to render CRD")?;
    print!("{yaml}");
    Ok(())
}

async fn cmd_manifests(args: &InstallerArgs, json: bool) -> Result<()> {
    let decoded = inspect_catalog(&args.catalog())
        .await
        .map_err(|(bundle, e)| anyhow!("bundle {bundle}: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing(&decoded))?);
        return Ok(());
    }

    for bundle in &decoded {
        println!("{} ({}, {} objects)", bundle.name, bundle.digest.short(), bundle.objects.len());
        for object in &bundle.objects {
            println!("  {}", object.key());
        }
    }
    Ok(())
}

fn listing(decoded: &[DecodedBundle]) -> serde_json::Value {
    decoded
        .iter()
        .map(|bundle| {
            serde_json::json!({
                "bundle": bundle.name,
                "digest": bundle.digest.as_str(),
                "objects": bundle.objects.iter().map(|o| o.key()).collect::<Vec<_>>(),
            })
        })
        .collect()
}
