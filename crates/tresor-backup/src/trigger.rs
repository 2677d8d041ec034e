//! From "control plane initialized" to a backup run

use crate::error::{Error, Result};
use crate::orchestrator::{BackupOrchestrator, BackupOutcome};
use crate::target::BackupTarget;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use tresor_git::OperationContext;

/// Data key of the credential secret that holds the kubeconfig
pub const CREDENTIAL_DATA_KEY: &str = "value";

/// Name of the secret generated for a control plane
pub fn credential_secret_name(control_plane: &str) -> String {
    format!("{}-kubeconfig", control_plane)
}

/// A control-plane object as seen by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlaneEvent {
    pub namespace: String,
    pub name: String,
    /// `status.initialized`
    pub initialized: bool,
}

/// Contents and creation time of a fetched secret
#[derive(Clone, Default)]
pub struct CredentialSecret {
    pub data: BTreeMap<String, Vec<u8>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSecret")
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Where credential secrets come from
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch a secret; `Ok(None)` when it does not exist
    async fn fetch(&self, namespace: &str, secret_name: &str) -> Result<Option<CredentialSecret>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The control plane is not initialized yet; nothing to back up
    NotReady,
    Completed(BackupOutcome),
}

/// Handle one control-plane event.
///
/// The backup itself runs on the blocking pool; once started it is not
/// cancelled even if the caller's future is dropped.
pub async fn handle_trigger(
    orchestrator: Arc<BackupOrchestrator>,
    source: &dyn CredentialSource,
    event: &ControlPlaneEvent,
    ctx: OperationContext,
) -> Result<TriggerOutcome> {
    if !event.initialized {
        debug!(namespace = %event.namespace, name = %event.name, "Control plane not initialized yet");
        return Ok(TriggerOutcome::NotReady);
    }

    let secret_name = credential_secret_name(&event.name);
    let missing = |reason: &str| Error::credential_missing(&event.namespace, &secret_name, reason);

    let mut secret = source
        .fetch(&event.namespace, &secret_name)
        .await?
        .ok_or_else(|| missing("secret not found"))?;
    let created_at = secret
        .created_at
        .ok_or_else(|| missing("secret has no creation timestamp"))?;
    let payload = secret
        .data
        .remove(CREDENTIAL_DATA_KEY)
        .ok_or_else(|| missing("secret has no 'value' key"))?;

    let target = BackupTarget::from_resource(&event.namespace, &event.name, payload, created_at);

    let outcome = tokio::task::spawn_blocking(move || orchestrator.run_backup(&ctx, &target))
        .await
        .map_err(|e| Error::Worker {
            message: e.to_string(),
        })??;

    Ok(TriggerOutcome::Completed(outcome))
}
