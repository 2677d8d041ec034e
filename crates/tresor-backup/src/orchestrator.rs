//! One backup attempt from synchronize to push

use crate::error::{Error, Result};
use crate::freshness::{FreshnessProbe, SopsFreshnessProbe};
use crate::target::BackupTarget;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tresor_git::{CommitIdentity, Oid, OperationContext, RepositoryHandle};
use tresor_sops::{EncryptionPolicy, StructuredEncryptor, POLICY_FILE_NAME};

/// Why a target was not backed up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Namespace does not split into three `-`-separated segments
    InvalidNamespaceShape { namespace: String },
}

/// Result of a backup attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// A new archive was committed and pushed
    Written { path: PathBuf, commit: Oid },
    /// The existing archive is newer than the credential
    UpToDate { path: PathBuf },
    Skipped(SkipReason),
}

impl fmt::Display for BackupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written { path, commit } => {
                write!(f, "wrote {} in commit {}", path.display(), commit)
            }
            Self::UpToDate { path } => write!(f, "{} is up to date", path.display()),
            Self::Skipped(SkipReason::InvalidNamespaceShape { namespace }) => write!(
                f,
                "skipped: namespace '{}' is not of the form <a>-<b>-<c>",
                namespace
            ),
        }
    }
}

/// Runs backups against the shared repository handle
pub struct BackupOrchestrator {
    repository: Arc<RepositoryHandle>,
    encryptor: StructuredEncryptor,
    identity: CommitIdentity,
    probe: Box<dyn FreshnessProbe>,
}

impl BackupOrchestrator {
    pub fn new(repository: Arc<RepositoryHandle>, identity: CommitIdentity) -> Self {
        Self {
            repository,
            encryptor: StructuredEncryptor::new(),
            identity,
            probe: Box::new(SopsFreshnessProbe),
        }
    }

    /// Replace the freshness policy
    pub fn with_probe(mut self, probe: impl FreshnessProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn repository(&self) -> &Arc<RepositoryHandle> {
        &self.repository
    }

    /// Back up one credential.
    ///
    /// Blocking: holds the repository lock for the whole attempt, including
    /// network fetch and push. Call from a worker thread in async contexts.
    pub fn run_backup(&self, ctx: &OperationContext, target: &BackupTarget) -> Result<BackupOutcome> {
        let Some(destination) = target.destination() else {
            warn!(
                namespace = %target.namespace(),
                name = %target.name(),
                "Namespace is not of the form <a>-<b>-<c>, skipping backup"
            );
            return Ok(BackupOutcome::Skipped(SkipReason::InvalidNamespaceShape {
                namespace: target.namespace().to_string(),
            }));
        };
        let path = PathBuf::from(destination);

        let mut guard = self.repository.lock();
        guard.synchronize(ctx)?;

        if let Some(existing) = guard.read_if_exists(&path)? {
            if self.probe.is_up_to_date(&existing, target.observed_at())? {
                debug!(path = %destination, "Archive is newer than credential");
                return Ok(BackupOutcome::UpToDate { path });
            }
        }

        let policy_bytes = guard
            .read_if_exists(Path::new(POLICY_FILE_NAME))?
            .ok_or_else(|| Error::PolicyUnavailable {
                path: POLICY_FILE_NAME.to_string(),
            })?;
        let policy = EncryptionPolicy::from_yaml(&String::from_utf8_lossy(&policy_bytes))?;
        let resolved = policy.resolve(destination)?;

        let document = self.encryptor.encrypt(target.payload(), &resolved)?;
        let archive = document.to_yaml()?;

        let commit = guard.write_commit_push(
            ctx,
            &path,
            archive.as_bytes(),
            &self.identity,
            &format!("add {}", destination),
        )?;

        info!(
            namespace = %target.namespace(),
            name = %target.name(),
            path = %destination,
            commit = %commit,
            "Backed up credential"
        );
        Ok(BackupOutcome::Written { path, commit })
    }
}
