//! CLI command implementations

pub mod backup;
pub mod policy;
pub mod run;
pub mod version;

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tresor_backup::BackupOrchestrator;
use tresor_core::{ConfigLoader, TresorConfig};
use tresor_git::{CommitIdentity, Credentials, OperationContext, RemoteSpec, RepositoryHandle};

/// Load and validate configuration from the usual search paths
pub(crate) fn load_config(explicit: Option<&Utf8Path>) -> Result<TresorConfig> {
    let config = ConfigLoader::new()
        .load(explicit)
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Open the backup repository and build the orchestrator around it.
///
/// Failure here is fatal: nothing can be backed up without the repository.
pub(crate) async fn build_orchestrator(config: &TresorConfig) -> Result<Arc<BackupOrchestrator>> {
    let repo = &config.repository;
    let remote = RemoteSpec::new(
        repo.url.clone(),
        repo.branch.clone(),
        Credentials::new(repo.username.clone(), repo.token.clone()),
    );
    let clone_dir = repo.clone_dir.clone();

    info!("Opening backup repository {} ({})", repo.url, repo.branch);
    let handle = tokio::task::spawn_blocking(move || {
        RepositoryHandle::open_or_clone(remote, clone_dir.as_deref().map(|p| p.as_std_path()))
    })
    .await
    .context("Repository worker failed")?
    .context("Backup repository unavailable")?;

    let identity = CommitIdentity::new(config.author.name.clone(), config.author.email.clone());
    Ok(Arc::new(BackupOrchestrator::new(Arc::new(handle), identity)))
}

/// Deadline for the network calls of one backup attempt
pub(crate) fn operation_context(config: &TresorConfig) -> OperationContext {
    match config.controller.operation_timeout_secs {
        0 => OperationContext::background(),
        secs => OperationContext::with_timeout(Duration::from_secs(secs)),
    }
}
