//! Error types for tresor-git

use thiserror::Error;

/// Result type alias using tresor-git's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Repository error types
#[derive(Error, Debug)]
pub enum Error {
    /// Clone or open failed; the process cannot run without a repository
    #[error("Repository {url} unavailable: {message}")]
    RepositoryUnavailable { url: String, message: String },

    /// Fetch or reset failed; the next attempt starts over
    #[error("Failed to synchronize branch '{branch}': {message}")]
    SyncFailed { branch: String, message: String },

    /// Writing, staging or committing the file failed
    #[error("Failed to commit {path}: {message}")]
    CommitFailed { path: String, message: String },

    /// The commit exists locally but did not reach the remote
    #[error("Failed to push branch '{branch}': {message}")]
    PushFailed { branch: String, message: String },

    /// Read or write attempted without a successful synchronize on this guard
    #[error("Working tree is not synchronized with the remote branch")]
    NotSynchronized,

    /// Path is absolute, escapes the working tree, or targets git metadata
    #[error("Invalid repository path: {path}")]
    InvalidPath { path: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a repository unavailable error
    pub fn unavailable(url: impl Into<String>, message: impl ToString) -> Self {
        Self::RepositoryUnavailable {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a sync failed error
    pub fn sync_failed(branch: impl Into<String>, message: impl ToString) -> Self {
        Self::SyncFailed {
            branch: branch.into(),
            message: message.to_string(),
        }
    }

    /// Create a commit failed error
    pub fn commit_failed(path: impl Into<String>, message: impl ToString) -> Self {
        Self::CommitFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a push failed error
    pub fn push_failed(branch: impl Into<String>, message: impl ToString) -> Self {
        Self::PushFailed {
            branch: branch.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Whether re-running the attempt may succeed without any change.
    ///
    /// Only synchronization failures qualify; they are transient network
    /// conditions. Commit and push failures are reported to the caller, whose
    /// redelivery is made idempotent by the freshness check.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SyncFailed { .. })
    }
}
