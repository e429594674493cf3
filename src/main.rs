// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{bail, Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use podcapture::capture::{CaptureManager, CaptureSettings};
use podcapture::config::Config;
use podcapture::kubernetes::pod_events;
use podcapture::reconcilers::PodReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    info!(node = %config.node_name, "Starting packet capture controller");
    info!(
        "Configuration loaded: capture_dir={}, binary={}, rotate_mb={}",
        config.capture_dir.display(),
        config.capture_binary.display(),
        config.rotate_mb
    );

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let manager = Arc::new(CaptureManager::new(CaptureSettings::from(&config)));
    let reconciler = PodReconciler::new(manager.clone(), config.liveness_interval);

    // Gracefully exit on either SIGINT (ctrl-c) or SIGTERM.
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => (),
        }
        info!("Received shutdown signal");
    };

    reconciler
        .run(pod_events(client, &config.node_name), shutdown)
        .await;

    info!("Controller shutting down, stopping all captures");
    match config.shutdown_timeout {
        Some(timeout) => {
            if tokio::time::timeout(timeout, manager.stop_all()).await.is_err() {
                error!("Timed out after {:?} stopping captures", timeout);
                bail!("captures did not stop within {:?}", timeout);
            }
        }
        None => manager.stop_all().await,
    }

    info!("All captures stopped");
    Ok(())
}
