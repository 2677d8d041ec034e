//! Run command: the long-running controller

use crate::cli::RunArgs;
use crate::controller;
use crate::leader::{default_identity, LeaderElector};
use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use std::sync::Arc;
use tracing::info;

pub async fn run(args: RunArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let orchestrator = super::build_orchestrator(&config).await?;

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let leadership = if args.leader_elect {
        let namespace = args
            .leader_election_namespace
            .clone()
            .unwrap_or_else(|| client.default_namespace().to_string());
        let elector = Arc::new(LeaderElector::new(client.clone(), namespace, default_identity()));
        Some(elector.acquire().await)
    } else {
        None
    };

    info!(
        version = %config.controller.control_plane_version,
        namespace = args.namespace.as_deref().unwrap_or("*"),
        "Starting KubeadmControlPlane controller"
    );
    let controller = controller::run(client, orchestrator, config, args.namespace);

    match leadership {
        None => controller.await,
        Some(mut guard) => {
            let lost = tokio::select! {
                _ = controller => false,
                _ = guard.lost() => true,
            };
            if lost {
                bail!("Lost leadership of the backup branch, exiting");
            }
            guard.release().await;
        }
    }

    info!("Controller stopped");
    Ok(())
}
