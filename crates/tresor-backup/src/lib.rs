//! Tresor backup pipeline
//!
//! Ties the repository and the encryption step together for one credential:
//! - [`BackupTarget`] derives where a credential is archived
//! - [`BackupOrchestrator`] synchronizes, checks freshness, encrypts and
//!   commits under a single repository lock acquisition
//! - [`handle_trigger`] turns a control-plane event into a backup run on a
//!   blocking worker
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use tresor_backup::{BackupOrchestrator, BackupTarget};
//! use tresor_git::{CommitIdentity, Credentials, OperationContext, RemoteSpec, RepositoryHandle};
//!
//! # fn example() -> tresor_backup::Result<()> {
//! let remote = RemoteSpec::new("https://git.example.com/kubeconfigs.git", "main", Credentials::anonymous());
//! let repository = Arc::new(RepositoryHandle::open_or_clone(remote, None)?);
//! let orchestrator = BackupOrchestrator::new(
//!     repository,
//!     CommitIdentity::new("tresor-operator", "operator@tresor.local"),
//! );
//!
//! let target = BackupTarget::from_resource("cluster-a-prod", "cp", b"apiVersion: v1\n".to_vec(), Utc::now());
//! let outcome = orchestrator.run_backup(&OperationContext::background(), &target)?;
//! println!("{}", outcome);
//! # Ok(())
//! # }
//! ```

mod error;
mod freshness;
mod orchestrator;
mod target;
mod trigger;

pub use error::{Error, Result};
pub use freshness::{FreshnessProbe, SopsFreshnessProbe};
pub use orchestrator::{BackupOrchestrator, BackupOutcome, SkipReason};
pub use target::{destination_for, BackupTarget};
pub use trigger::{
    credential_secret_name, handle_trigger, ControlPlaneEvent, CredentialSecret, CredentialSource,
    TriggerOutcome, CREDENTIAL_DATA_KEY,
};
