//! KubeadmControlPlane controller
//!
//! Watches control planes as dynamic objects and hands every reconcile to
//! [`tresor_backup::handle_trigger`]. Kubernetes is only touched here.

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use tresor_backup::{
    handle_trigger, BackupOrchestrator, ControlPlaneEvent, CredentialSecret, CredentialSource,
    Error, Result, TriggerOutcome,
};
use tresor_core::{ControllerConfig, TresorConfig};
use tresor_git::OperationContext;

/// Server-side watch timeout; must stay below the client read timeout so
/// idle watches are closed by the API server first.
const WATCH_TIMEOUT_SECS: u32 = 25;

const CONTROL_PLANE_GROUP: &str = "controlplane.cluster.x-k8s.io";
const CONTROL_PLANE_KIND: &str = "KubeadmControlPlane";
const CONTROL_PLANE_PLURAL: &str = "kubeadmcontrolplanes";

/// Shared state for reconcile and error policy
pub struct Context {
    orchestrator: Arc<BackupOrchestrator>,
    secrets: KubeCredentialSource,
    config: ControllerConfig,
    operation_timeout: Option<Duration>,
}

/// Reads generated kubeconfig secrets through the core/v1 API
pub struct KubeCredentialSource {
    client: Client,
}

#[async_trait]
impl CredentialSource for KubeCredentialSource {
    async fn fetch(&self, namespace: &str, secret_name: &str) -> Result<Option<CredentialSecret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get_opt(secret_name).await.map_err(Error::source_failed)?;

        Ok(secret.map(|secret| CredentialSecret {
            data: secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, value.0))
                .collect(),
            created_at: secret.metadata.creation_timestamp.map(|t| t.0),
        }))
    }
}

fn control_plane_resource(version: &str) -> ApiResource {
    ApiResource {
        group: CONTROL_PLANE_GROUP.to_string(),
        version: version.to_string(),
        api_version: format!("{}/{}", CONTROL_PLANE_GROUP, version),
        kind: CONTROL_PLANE_KIND.to_string(),
        plural: CONTROL_PLANE_PLURAL.to_string(),
    }
}

/// Map a watched object to the trigger the backup pipeline understands
fn to_event(object: &DynamicObject) -> ControlPlaneEvent {
    let initialized = object
        .data
        .get("status")
        .and_then(|status| status.get("initialized"))
        .and_then(|value| value.as_bool())
        .unwrap_or(false);

    ControlPlaneEvent {
        namespace: object.namespace().unwrap_or_default(),
        name: object.name_any(),
        initialized,
    }
}

async fn reconcile(object: Arc<DynamicObject>, ctx: Arc<Context>) -> Result<Action> {
    let event = to_event(&object);
    let operation = match ctx.operation_timeout {
        Some(timeout) => OperationContext::with_timeout(timeout),
        None => OperationContext::background(),
    };

    let outcome = handle_trigger(ctx.orchestrator.clone(), &ctx.secrets, &event, operation).await?;
    match outcome {
        TriggerOutcome::NotReady => {}
        TriggerOutcome::Completed(outcome) => {
            debug!(namespace = %event.namespace, name = %event.name, "{}", outcome)
        }
    }
    Ok(Action::await_change())
}

fn error_policy(object: Arc<DynamicObject>, error: &Error, ctx: Arc<Context>) -> Action {
    let delay = if error.is_retryable() {
        ctx.config.requeue_retry_secs
    } else {
        ctx.config.requeue_error_secs
    };

    warn!(
        namespace = %object.namespace().unwrap_or_default(),
        name = %object.name_any(),
        retry_in_secs = delay,
        "Backup failed: {}",
        error
    );
    Action::requeue(Duration::from_secs(delay))
}

/// Run the controller until a termination signal arrives
pub async fn run(
    client: Client,
    orchestrator: Arc<BackupOrchestrator>,
    config: TresorConfig,
    namespace: Option<String>,
) {
    let resource = control_plane_resource(&config.controller.control_plane_version);
    let api: Api<DynamicObject> = match &namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &resource),
        None => Api::all_with(client.clone(), &resource),
    };

    let operation_timeout = match config.controller.operation_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let ctx = Arc::new(Context {
        orchestrator,
        secrets: KubeCredentialSource { client },
        config: config.controller,
        operation_timeout,
    });

    Controller::new_with(
        api,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        resource,
    )
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx)
    .for_each(|result| {
        match result {
            Ok((object, _)) => debug!(name = %object.name, "Reconciled"),
            Err(e) => error!(error = ?e, "Reconcile loop error"),
        }
        std::future::ready(())
    })
    .await;
}
