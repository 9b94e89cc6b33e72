// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use secret_sync::config::Config;
use secret_sync::kubernetes::{wait_for_secretsync_crd, KubeStore, Store};
use secret_sync::reconcilers::{Context, SecretSyncReconciler};
use secret_sync::sync::SourceIndex;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting SecretSync controller");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: controller_name={}, retry_delay={:?}, watch_namespace={:?}",
        config.controller_name, config.retry_delay, config.watch_namespace
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Wait for the SecretSync CRD before starting the reconciler
    info!("Waiting for SecretSync CRD to become available...");
    wait_for_secretsync_crd(&client).await?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    let store: Arc<dyn Store> = Arc::new(KubeStore::new(
        client.clone(),
        config.watch_namespace.clone(),
    ));
    let context = Context::new(store, &config, SourceIndex::shared(), cancel);
    let reconciler = SecretSyncReconciler::new(client, config, context);

    info!("Starting reconciler...");
    reconciler.run().await?;

    warn!("SecretSync reconciler stopped");
    Ok(())
}

/// Cancel in-flight reconciles once a shutdown signal arrives
async fn cancel_on_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal, cancelling reconciles..."),
        _ = terminate => info!("Received terminate signal, cancelling reconciles..."),
    }
    cancel.cancel();
}
