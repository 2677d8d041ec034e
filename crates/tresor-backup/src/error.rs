//! Error types for tresor-backup

use thiserror::Error;

/// Result type alias using tresor-backup's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Backup error types
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Repository(#[from] tresor_git::Error),

    #[error(transparent)]
    Encryption(#[from] tresor_sops::Error),

    /// The repository has no policy file to resolve recipients from
    #[error("Policy file {path} not found in backup repository")]
    PolicyUnavailable { path: String },

    /// The credential secret is absent or lacks the expected data
    #[error("Credential secret {namespace}/{secret}: {reason}")]
    CredentialMissing {
        namespace: String,
        secret: String,
        reason: String,
    },

    /// The credential source itself failed (API error, timeout)
    #[error("Credential source error: {message}")]
    Source { message: String },

    /// The blocking worker running the backup panicked or was cancelled
    #[error("Backup worker failed: {message}")]
    Worker { message: String },
}

impl Error {
    /// Create a credential missing error
    pub fn credential_missing(
        namespace: impl Into<String>,
        secret: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::CredentialMissing {
            namespace: namespace.into(),
            secret: secret.into(),
            reason: reason.into(),
        }
    }

    /// Create a credential source error
    pub fn source_failed(message: impl ToString) -> Self {
        Self::Source {
            message: message.to_string(),
        }
    }

    /// Whether the caller should retry soon rather than after the usual delay
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository(e) => e.is_retryable(),
            _ => false,
        }
    }
}
