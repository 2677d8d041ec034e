//! The shared working clone and its lock

use crate::auth::{remote_callbacks, RemoteSpec};
use crate::context::OperationContext;
use crate::error::{Error, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Commit, FetchOptions, Oid, PushOptions, Repository, ResetType, Signature};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const REMOTE_NAME: &str = "origin";

/// Author and committer of backup commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Synchronization state of one lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing verified yet, or the last operation failed
    Unsynced,
    /// Working tree matches the fetched remote branch
    Synced,
}

struct Worktree {
    repo: Repository,
    root: PathBuf,
}

/// Process-wide handle on the backup repository clone.
///
/// Created once at startup and shared behind an `Arc`. All access goes through
/// [`RepositoryHandle::lock`].
pub struct RepositoryHandle {
    worktree: Mutex<Worktree>,
    remote: RemoteSpec,
    root: PathBuf,
    // Keeps a scratch clone alive for the lifetime of the handle.
    _scratch: Option<TempDir>,
}

impl RepositoryHandle {
    /// Clone the remote branch, or open and force-refresh an existing clone.
    ///
    /// With no `local_path` the clone lives in a scratch directory removed
    /// when the handle is dropped. An empty or missing directory is cloned
    /// into; a non-empty one is opened, force-fetched, and force-checked-out
    /// at the remote branch tip.
    pub fn open_or_clone(remote: RemoteSpec, local_path: Option<&Path>) -> Result<Self> {
        let ctx = OperationContext::background();

        let (root, scratch) = match local_path {
            Some(path) => (path.to_path_buf(), None),
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("tresor-repo-")
                    .tempdir()
                    .map_err(|e| Error::unavailable(&remote.url, e))?;
                (dir.path().to_path_buf(), Some(dir))
            }
        };

        let populated = has_entries(&root).map_err(|e| Error::unavailable(&remote.url, e))?;
        let repo = if populated {
            info!("Opening existing clone at {}", root.display());
            open_existing(&root, &remote, ctx)
        } else {
            info!("Cloning {} ({}) into {}", remote.url, remote.branch, root.display());
            clone_fresh(&root, &remote, ctx)
        }
        .map_err(|e| Error::unavailable(&remote.url, e.message()))?;

        Ok(Self {
            worktree: Mutex::new(Worktree {
                repo,
                root: root.clone(),
            }),
            remote,
            root,
            _scratch: scratch,
        })
    }

    /// Acquire the exclusive lock.
    ///
    /// Blocks until no other guard is alive. The returned guard starts
    /// [`SyncState::Unsynced`]; the lock is released when it is dropped.
    pub fn lock(&self) -> RepositoryGuard<'_> {
        let worktree = self.worktree.lock().unwrap_or_else(|poisoned| {
            // The next synchronize discards whatever the panicking holder left.
            warn!("Repository lock was poisoned, recovering");
            poisoned.into_inner()
        });

        RepositoryGuard {
            worktree,
            remote: &self.remote,
            state: SyncState::Unsynced,
        }
    }

    /// Root of the working tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn branch(&self) -> &str {
        &self.remote.branch
    }

    pub fn url(&self) -> &str {
        &self.remote.url
    }
}

/// Exclusive access to the working clone.
///
/// Every mutating operation lives here, so the synchronize that establishes
/// the base and the commit built on it cannot be interleaved with another
/// writer.
pub struct RepositoryGuard<'a> {
    worktree: MutexGuard<'a, Worktree>,
    remote: &'a RemoteSpec,
    state: SyncState,
}

impl RepositoryGuard<'_> {
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Force-fetch the branch and hard-reset the working tree to it.
    ///
    /// Stray local modifications and unpushed commits are discarded. Returns
    /// the commit the tree now sits on.
    pub fn synchronize(&mut self, ctx: &OperationContext) -> Result<Oid> {
        self.state = SyncState::Unsynced;
        let branch = &self.remote.branch;

        if ctx.is_expired() {
            return Err(Error::sync_failed(branch, "deadline exceeded"));
        }

        let repo = &self.worktree.repo;
        fetch_branch(repo, self.remote, *ctx).map_err(|e| Error::sync_failed(branch, e.message()))?;
        let head = tracking_commit(repo, self.remote)
            .and_then(|commit| reset_branch_to(repo, self.remote, &commit).map(|_| commit.id()))
            .map_err(|e| Error::sync_failed(branch, e.message()))?;

        debug!(commit = %head, branch = %branch, "Working tree synchronized");
        self.state = SyncState::Synced;
        Ok(head)
    }

    /// Current content of `relative`, or `None` when the file does not exist.
    pub fn read_if_exists(&self, relative: &Path) -> Result<Option<Vec<u8>>> {
        self.ensure_synced()?;
        let relative = validate_relative(relative)?;

        match fs::read(self.worktree.root.join(&relative)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write `content` at `relative`, commit it, and push the branch.
    ///
    /// On push failure the local commit is kept but the guard drops back to
    /// [`SyncState::Unsynced`]; the next synchronize resets it away.
    pub fn write_commit_push(
        &mut self,
        ctx: &OperationContext,
        relative: &Path,
        content: &[u8],
        identity: &CommitIdentity,
        message: &str,
    ) -> Result<Oid> {
        self.ensure_synced()?;
        let relative = validate_relative(relative)?;

        let result = self
            .commit_file(&relative, content, identity, message)
            .and_then(|oid| self.push(ctx).map(|_| oid));

        match &result {
            Ok(oid) => info!(commit = %oid, path = %relative.display(), "Pushed backup commit"),
            Err(_) => self.state = SyncState::Unsynced,
        }
        result
    }

    fn ensure_synced(&self) -> Result<()> {
        match self.state {
            SyncState::Synced => Ok(()),
            SyncState::Unsynced => Err(Error::NotSynchronized),
        }
    }

    fn commit_file(
        &self,
        relative: &Path,
        content: &[u8],
        identity: &CommitIdentity,
        message: &str,
    ) -> Result<Oid> {
        let display = relative.display().to_string();
        let target = self.worktree.root.join(relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::commit_failed(&display, e))?;
        }
        fs::write(&target, content).map_err(|e| Error::commit_failed(&display, e))?;

        let repo = &self.worktree.repo;
        let commit = || -> std::result::Result<Oid, git2::Error> {
            let mut index = repo.index()?;
            index.add_path(relative)?;
            index.write()?;
            let tree = repo.find_tree(index.write_tree()?)?;
            let parent = repo.head()?.peel_to_commit()?;
            let signature = Signature::now(&identity.name, &identity.email)?;
            repo.commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &[&parent],
            )
        };

        commit().map_err(|e| Error::commit_failed(&display, e.message()))
    }

    fn push(&self, ctx: &OperationContext) -> Result<()> {
        let branch = &self.remote.branch;
        if ctx.is_expired() {
            return Err(Error::push_failed(branch, "deadline exceeded"));
        }

        let repo = &self.worktree.repo;
        let mut rejection: Option<String> = None;
        {
            let mut callbacks = remote_callbacks(&self.remote.credentials, *ctx);
            callbacks.push_update_reference(|refname, status| {
                if let Some(status) = status {
                    rejection = Some(format!("{} rejected: {}", refname, status));
                }
                Ok(())
            });

            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let mut origin = repo
                .find_remote(REMOTE_NAME)
                .map_err(|e| Error::push_failed(branch, e.message()))?;
            origin
                .push(&[self.remote.push_refspec().as_str()], Some(&mut options))
                .map_err(|e| Error::push_failed(branch, e.message()))?;
        }

        match rejection {
            Some(reason) => Err(Error::push_failed(branch, reason)),
            None => Ok(()),
        }
    }
}

fn has_entries(path: &Path) -> std::io::Result<bool> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        return Ok(false);
    }
    Ok(fs::read_dir(path)?.next().is_some())
}

fn clone_fresh(
    root: &Path,
    remote: &RemoteSpec,
    ctx: OperationContext,
) -> std::result::Result<Repository, git2::Error> {
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(remote_callbacks(&remote.credentials, ctx));

    RepoBuilder::new()
        .branch(&remote.branch)
        .fetch_options(fetch)
        .clone(&remote.url, root)
}

fn open_existing(
    root: &Path,
    remote: &RemoteSpec,
    ctx: OperationContext,
) -> std::result::Result<Repository, git2::Error> {
    let repo = Repository::open(root)?;

    // The configured URL wins over whatever the clone was made from.
    if repo.find_remote(REMOTE_NAME).is_ok() {
        repo.remote_set_url(REMOTE_NAME, &remote.url)?;
    } else {
        repo.remote(REMOTE_NAME, &remote.url)?;
    }

    fetch_branch(&repo, remote, ctx)?;
    {
        let commit = tracking_commit(&repo, remote)?;
        reset_branch_to(&repo, remote, &commit)?;
    }
    Ok(repo)
}

fn fetch_branch(
    repo: &Repository,
    remote: &RemoteSpec,
    ctx: OperationContext,
) -> std::result::Result<(), git2::Error> {
    let mut origin = repo.find_remote(REMOTE_NAME)?;
    let mut options = FetchOptions::new();
    options.remote_callbacks(remote_callbacks(&remote.credentials, ctx));

    origin.fetch(
        &[remote.fetch_refspec(REMOTE_NAME).as_str()],
        Some(&mut options),
        None,
    )
}

fn tracking_commit<'r>(
    repo: &'r Repository,
    remote: &RemoteSpec,
) -> std::result::Result<Commit<'r>, git2::Error> {
    repo.find_reference(&remote.tracking_ref(REMOTE_NAME))?
        .peel_to_commit()
}

/// Point the local branch at `commit`, check it out, and discard local changes
fn reset_branch_to(
    repo: &Repository,
    remote: &RemoteSpec,
    commit: &Commit<'_>,
) -> std::result::Result<(), git2::Error> {
    let local_ref = remote.local_ref();
    repo.reference(&local_ref, commit.id(), true, "tresor: reset to upstream")?;
    repo.set_head(&local_ref)?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))
}

/// Normalize a repository-relative path, rejecting anything that could
/// escape the working tree or touch git metadata.
fn validate_relative(path: &Path) -> Result<PathBuf> {
    let invalid = || Error::invalid_path(path.display().to_string());
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid())
            }
        }
    }

    let first = normalized.components().next();
    match first {
        None => Err(invalid()),
        Some(Component::Normal(part)) if part == ".git" => Err(invalid()),
        Some(_) => Ok(normalized),
    }
}
