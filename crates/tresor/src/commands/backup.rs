//! One-shot backup of a local kubeconfig file

use crate::cli::BackupArgs;
use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use tracing::info;
use tresor_backup::BackupTarget;

pub async fn run(args: BackupArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = super::load_config(config_path)?;

    let payload = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read credential file: {}", args.file))?;
    let observed_at = match &args.observed_at {
        Some(ts) => parse_timestamp(ts)?,
        None => file_mtime(&args.file)?,
    };

    let orchestrator = super::build_orchestrator(&config).await?;
    let target = BackupTarget::from_resource(&args.namespace, &args.name, payload, observed_at);
    let ctx = super::operation_context(&config);

    info!(namespace = %args.namespace, name = %args.name, "Backing up {}", args.file);
    let outcome = tokio::task::spawn_blocking(move || orchestrator.run_backup(&ctx, &target))
        .await
        .context("Backup worker failed")??;

    println!("{}", outcome);
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| anyhow!("Invalid --observed-at '{}': {}", value, e))
}

fn file_mtime(path: &Utf8Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time of {}", path))?;
    Ok(DateTime::<Utc>::from(modified))
}
