//! dbguard operator - declarative database backups on Kubernetes

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::batch::v1::CronJob;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dbguard_common::crd::DatabaseBackup;
use dbguard_common::FIELD_MANAGER;
use dbguard_operator::{error_policy, reconcile, ControllerContext, OperatorConfig};

/// dbguard - CRD-driven operator turning DatabaseBackup resources into CronJobs
#[derive(Parser, Debug)]
#[command(name = "dbguard", version, about, long_about = None)]
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
    /// Watches DatabaseBackup resources and reconciles each one into an
    /// owned CronJob, then keeps the resource status in sync with the
    /// CronJob's observed schedule activity.
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
        let crd = serde_yaml::to_string(&DatabaseBackup::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Ensure the DatabaseBackup CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply,
/// so the CRD version always matches the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing DatabaseBackup CRD...");
    crds.patch(
        "databasebackups.backup.example.com",
        &params,
        &Patch::Apply(&DatabaseBackup::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install DatabaseBackup CRD: {}", e))?;

    tracing::info!("DatabaseBackup CRD installed/updated");
    Ok(())
}

/// Run in controller mode - reconciles DatabaseBackup resources
async fn run_controller() -> anyhow::Result<()> {
    tracing::info!("dbguard controller starting...");

    let config = OperatorConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    // Operator installs its own CRD on startup
    ensure_crds_installed(&client).await?;

    // Scope the watch to a single namespace when configured
    let (backups, cronjobs): (Api<DatabaseBackup>, Api<CronJob>) = match &config.namespace {
        Some(ns) => {
            tracing::info!(namespace = %ns, "Watching a single namespace");
            (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            )
        }
        None => {
            tracing::info!("Watching all namespaces");
            (Api::all(client.clone()), Api::all(client.clone()))
        }
    };

    let ctx = Arc::new(ControllerContext::new(client, Arc::new(config)));

    tracing::info!("Starting DatabaseBackup controller...");

    // Watch timeout stays below the client read timeout
    let watcher_config = WatcherConfig::default().timeout(25);

    // Owned CronJobs are watched too, so drift triggers reconciliation
    Controller::new(backups, watcher_config.clone())
        .owns(cronjobs, watcher_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Backup reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Backup reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("dbguard controller shutting down");
    Ok(())
}
