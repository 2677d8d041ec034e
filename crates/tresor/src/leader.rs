//! Leader election over a coordination.k8s.io/v1 Lease
//!
//! Every replica shares one backup branch, so only the lease holder may run
//! the controller. Updates carry the lease's `resourceVersion`; a concurrent
//! writer makes the replace fail with 409 and the loser keeps waiting.

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fixed lease name shared by all replicas
pub const LEADER_LEASE_NAME: &str = "tresor-controller-leader";

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// What this replica may do with the lease as it currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaseDecision {
    /// We hold it; extend the renew time
    Renew,
    /// Free or expired; claim it and bump the transition count
    TakeOver { transitions: i32 },
    /// Another replica holds a live lease
    HeldElsewhere,
}

pub(crate) fn decide(spec: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>) -> LeaseDecision {
    let holder = spec.and_then(|s| s.holder_identity.as_deref());
    if holder == Some(identity) {
        return LeaseDecision::Renew;
    }

    let renew_time = spec.and_then(|s| s.renew_time.as_ref());
    let duration = spec.and_then(|s| s.lease_duration_seconds);
    let expired = match (holder, renew_time, duration) {
        (Some(_), Some(renewed), Some(secs)) => {
            now > renewed.0 + chrono::Duration::seconds(secs.into())
        }
        _ => true,
    };

    if expired {
        LeaseDecision::TakeOver {
            transitions: spec.and_then(|s| s.lease_transitions).unwrap_or(0),
        }
    } else {
        LeaseDecision::HeldElsewhere
    }
}

/// Identity written into the lease: the pod name when running in a pod
pub fn default_identity() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| format!("tresor-{}", std::process::id()))
}

pub struct LeaderElector {
    client: Client,
    namespace: String,
    identity: String,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            identity: identity.into(),
        }
    }

    fn api(&self) -> Api<Lease> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Wait until the lease is ours, then keep renewing it in the background
    pub async fn acquire(self: Arc<Self>) -> LeaderGuard {
        info!(
            identity = %self.identity,
            namespace = %self.namespace,
            lease = LEADER_LEASE_NAME,
            "Waiting for leadership"
        );

        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Leadership acquired");
                    return self.guard();
                }
                Ok(false) => debug!(identity = %self.identity, "Lease held by another replica"),
                Err(e) => warn!(identity = %self.identity, error = %e, "Failed to acquire lease, retrying"),
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    fn guard(self: &Arc<Self>) -> LeaderGuard {
        let (lost_tx, lost_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let renewal = tokio::spawn(async move { elector.renew_until_lost(lost_tx).await });

        LeaderGuard {
            elector: Arc::clone(self),
            renewal,
            lost_rx: Some(lost_rx),
        }
    }

    async fn renew_until_lost(&self, lost_tx: oneshot::Sender<()>) {
        loop {
            tokio::time::sleep(RENEW_INTERVAL).await;
            match self.try_acquire_or_renew().await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(identity = %self.identity, "Lease taken by another replica");
                    break;
                }
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "Lease renewal failed");
                    break;
                }
            }
        }
        let _ = lost_tx.send(());
    }

    async fn try_acquire_or_renew(&self) -> Result<bool, kube::Error> {
        let api = self.api();
        let now = Utc::now();

        let Some(existing) = api.get_opt(LEADER_LEASE_NAME).await? else {
            return self.create(&api, now).await;
        };

        let (spec, transitions) = match decide(existing.spec.as_ref(), &self.identity, now) {
            LeaseDecision::HeldElsewhere => return Ok(false),
            LeaseDecision::Renew => {
                let mut spec = existing.spec.clone().unwrap_or_default();
                spec.renew_time = Some(MicroTime(now));
                (spec, None)
            }
            LeaseDecision::TakeOver { transitions } => {
                (self.claimed_spec(now, transitions + 1), Some(transitions + 1))
            }
        };

        let updated = Lease {
            metadata: ObjectMeta {
                name: Some(LEADER_LEASE_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                resource_version: existing.metadata.resource_version.clone(),
                ..Default::default()
            },
            spec: Some(spec),
        };

        match api.replace(LEADER_LEASE_NAME, &PostParams::default(), &updated).await {
            Ok(_) => {
                if let Some(transitions) = transitions {
                    info!(identity = %self.identity, transitions, "Took over expired lease");
                }
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, api: &Api<Lease>, now: DateTime<Utc>) -> Result<bool, kube::Error> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(LEADER_LEASE_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(self.claimed_spec(now, 0)),
        };

        match api.create(&PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn claimed_spec(&self, now: DateTime<Utc>, transitions: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(LEASE_DURATION.as_secs() as i32),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }
    }

    /// Clear the holder so a standby can take over without waiting for expiry
    async fn release(&self) -> Result<(), kube::Error> {
        let api = self.api();
        let Some(mut lease) = api.get_opt(LEADER_LEASE_NAME).await? else {
            return Ok(());
        };
        let Some(spec) = lease.spec.as_mut() else {
            return Ok(());
        };
        if spec.holder_identity.as_deref() != Some(self.identity.as_str()) {
            return Ok(());
        }

        spec.holder_identity = None;
        spec.renew_time = None;
        api.replace(LEADER_LEASE_NAME, &PostParams::default(), &lease)
            .await?;
        info!(identity = %self.identity, "Lease released");
        Ok(())
    }
}

/// Held while this replica leads; renewal stops when it is dropped
pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl LeaderGuard {
    /// Resolves once the lease could not be renewed
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.take() {
            let _ = rx.await;
        }
    }

    /// Stop renewing and hand the lease back
    pub async fn release(self) {
        self.renewal.abort();
        if let Err(e) = self.elector.release().await {
            warn!(error = %e, "Failed to release lease; standby waits for expiry");
        }
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.renewal.abort();
    }
}
