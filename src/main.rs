//! cert-manager operator - workload configuration reconciler

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cert_manager_operator::controller::{
    ensure_default_configuration, error_policy, reconcile, Context,
};
use cert_manager_operator::crd::CertManager;
use cert_manager_operator::credentials::PlatformType;
use cert_manager_operator::CLOUD_PLATFORM_ENV;

/// cert-manager operator - reconciles cert-manager workload configuration
#[derive(Parser, Debug)]
#[command(name = "cert-manager-operator", version, about, long_about = None)]
struct Cli {
    /// Generate the CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches the CertManager singleton and reconciles the three managed
    /// workload deployments on every change.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        // Generate CRD YAML
        let crd = serde_yaml::to_string(&CertManager::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Run in controller mode
async fn run_controller() -> anyhow::Result<()> {
    tracing::info!("cert-manager operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    // Materialize the empty-spec default so users have an object to edit.
    ensure_default_configuration(&client)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to ensure default configuration: {}", e))?;

    // The platform is derived from the operator's own environment; the
    // pipeline only consults it for the controller credential mount.
    let platform = PlatformType::parse(
        &std::env::var(CLOUD_PLATFORM_ENV).unwrap_or_default(),
    );
    tracing::info!(%platform, "detected cloud platform");

    let ctx = Arc::new(Context::builder(client.clone()).platform(platform).build());
    let configurations: Api<CertManager> = Api::all(client);

    tracing::info!("Starting CertManager controller...");
    Controller::new(configurations, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("controller terminated");
    Ok(())
}
