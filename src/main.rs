/// aks-realtime - AKS cluster with a redis-backed realtime app
///
/// Declares the Azure network, the managed cluster and the in-cluster
/// workloads as a resource graph, and previews the result without
/// touching any cloud.
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aks_realtime::config::StackConfig;
use aks_realtime::engine::PreviewEngine;
use aks_realtime::runtime::Context;
use aks_realtime::utils::fs::{create_private, write_private};
use aks_realtime::utils::ssh::generate_ed25519_keypair;
use aks_realtime::{k8s, topology};

const DEFAULT_SUBSCRIPTION_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Parser)]
#[command(name = "aks-realtime")]
#[command(about = "Declare an AKS cluster running a redis-backed realtime app", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Stack configuration file path
    #[arg(short, long, default_value = "stack.yaml")]
    config: PathBuf,

    /// Output directory for generated files
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan every resource and write the plan, kubeconfig and manifests
    Preview,

    /// Print the resource dependency graph in DOT format
    Graph,

    /// Generate an SSH key pair and an example stack configuration
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("aks_realtime={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Preview => preview(&cli).await,
        Commands::Graph => graph(&cli).await,
        Commands::Init => init_config(&cli).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn subscription_id(stack: &StackConfig) -> String {
    match stack.config.get("azure:subscriptionId") {
        Some(id) if !id.is_empty() => id.clone(),
        _ => {
            warn!("azure:subscriptionId not set, using {}", DEFAULT_SUBSCRIPTION_ID);
            DEFAULT_SUBSCRIPTION_ID.to_string()
        }
    }
}

/// Plan the stack and write the results to the output directory
async fn preview(cli: &Cli) -> Result<()> {
    let stack = StackConfig::from_file(&cli.config).context("Failed to load configuration")?;
    info!("Previewing {}/{}", stack.project, stack.stack);

    let engine = PreviewEngine::new(subscription_id(&stack));
    let project = stack.project.clone();
    let stack_name = stack.stack.clone();

    let mut ctx = Context::new(stack, Arc::new(engine.clone()));
    topology::declare(&mut ctx).context("Failed to declare resources")?;
    let summary = ctx.finish().await.context("Preview failed")?;

    tokio::fs::create_dir_all(&cli.output)
        .await
        .context("Failed to create output directory")?;

    let plan = engine.plan(&project, &stack_name, &summary);
    let plan_path = cli.output.join("plan.yaml");
    write_file(&plan_path, plan.to_yaml()?).await?;

    let kubeconfig = summary
        .outputs
        .get(topology::KUBECONFIG_OUTPUT)
        .and_then(|v| v.as_str())
        .context("Stack did not export a kubeconfig")?;
    let kubeconfig_path = cli.output.join("kubeconfig");
    write_private(&kubeconfig_path, kubeconfig).await?;

    let manifests_path = cli.output.join("manifests.yaml");
    write_file(&manifests_path, k8s::manifest::render(&engine.steps())?).await?;

    info!("✓ Preview completed: {} resources", summary.resources.len());
    info!("");
    info!("Generated files:");
    info!("  Plan: {}", plan_path.display());
    info!("  Kubeconfig: {}", kubeconfig_path.display());
    info!("  Manifests: {}", manifests_path.display());

    Ok(())
}

/// Print the declared dependency graph
async fn graph(cli: &Cli) -> Result<()> {
    let stack = StackConfig::from_file(&cli.config).context("Failed to load configuration")?;
    let engine = PreviewEngine::new(subscription_id(&stack));

    let mut ctx = Context::new(stack, Arc::new(engine));
    topology::declare(&mut ctx).context("Failed to declare resources")?;

    println!("{}", ctx.graph().to_dot());
    Ok(())
}

/// Initialize example configuration file and admin SSH key
async fn init_config(cli: &Cli) -> Result<()> {
    if cli.config.exists() {
        anyhow::bail!(
            "Configuration file already exists: {}",
            cli.config.display()
        );
    }

    let key_path = cli.output.join("id_ed25519");
    if key_path.exists() {
        anyhow::bail!("Private key already exists: {}", key_path.display());
    }

    let (public_key, private_key) = generate_ed25519_keypair("aks-realtime")?;

    tokio::fs::create_dir_all(&cli.output)
        .await
        .context("Failed to create output directory")?;
    create_private(&key_path, private_key).await?;

    let example_config = StackConfig::example(&public_key);
    let yaml = serde_yaml::to_string(&example_config)?;
    write_file(&cli.config, yaml).await?;

    info!("Example configuration created: {}", cli.config.display());
    info!("Admin private key written to {}", key_path.display());
    info!("");
    info!("Next steps:");
    info!("  1. Set azure:subscriptionId in the configuration file");
    info!("  2. Preview the stack:");
    info!("     aks-realtime preview");

    Ok(())
}

async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
