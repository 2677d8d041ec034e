//! Backup repository access
//!
//! This crate owns the single working clone the operator writes backups into:
//! - Clone-or-open of the remote branch at startup
//! - Force-fetch and hard-reset synchronization before every write
//! - Write, stage, commit and push of one file
//! - An exclusive lock serializing all of the above
//!
//! Mutating operations are only reachable through a [`RepositoryGuard`], so a
//! synchronize and the write that depends on it always share one lock
//! acquisition.
//!
//! ```no_run
//! use std::path::Path;
//! use tresor_git::{CommitIdentity, Credentials, OperationContext, RemoteSpec, RepositoryHandle};
//!
//! # fn example() -> tresor_git::Result<()> {
//! let remote = RemoteSpec::new(
//!     "https://git.example.com/platform/kubeconfigs.git",
//!     "main",
//!     Credentials::new("git", "glpat-xxxx"),
//! );
//! let handle = RepositoryHandle::open_or_clone(remote, None)?;
//! let ctx = OperationContext::background();
//!
//! let mut guard = handle.lock();
//! guard.synchronize(&ctx)?;
//! if guard.read_if_exists(Path::new("prod/a/cp.yaml"))?.is_none() {
//!     let identity = CommitIdentity::new("tresor-operator", "operator@tresor.local");
//!     guard.write_commit_push(&ctx, Path::new("prod/a/cp.yaml"), b"...", &identity, "add prod/a/cp.yaml")?;
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
mod context;
mod error;
mod repository;

pub use auth::{Credentials, RemoteSpec};
pub use context::OperationContext;
pub use error::{Error, Result};
pub use repository::{CommitIdentity, RepositoryGuard, RepositoryHandle, SyncState};

/// Re-exported so callers can name commit ids without depending on git2
pub use git2::Oid;
