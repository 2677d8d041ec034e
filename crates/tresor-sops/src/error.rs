//! Error types for tresor-sops

use thiserror::Error;

/// Result type alias using tresor-sops's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Policy and encryption error types
#[derive(Error, Debug)]
pub enum Error {
    /// Plaintext is not a YAML mapping, or is already encrypted
    #[error("Malformed input document: {message}")]
    MalformedInput { message: String },

    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// No creation rule matched the destination path
    #[error("No matching creation rule for path: {path}")]
    NoMatchingPolicy { path: String },

    /// A recipient could not be parsed, or there are none to wrap for
    #[error("Failed to wrap data key: {message}")]
    KeyWrapFailed { message: String },

    /// The field selector matched no leaf, so nothing would be protected
    #[error("encrypted_regex '{regex}' matched no values")]
    NothingEncrypted { regex: String },

    #[error("Invalid policy file: {message}")]
    InvalidPolicyFile { message: String },

    /// Existing archive bytes are not YAML
    #[error("Malformed archive: {message}")]
    MalformedArchive { message: String },

    #[error("Encryption failed: {message}")]
    Encryption { message: String },
}

impl Error {
    /// Create a malformed input error
    pub fn malformed_input(message: impl ToString) -> Self {
        Self::MalformedInput {
            message: message.to_string(),
        }
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Create a no matching policy error
    pub fn no_matching_policy(path: impl Into<String>) -> Self {
        Self::NoMatchingPolicy { path: path.into() }
    }

    /// Create a key wrap error
    pub fn key_wrap(message: impl ToString) -> Self {
        Self::KeyWrapFailed {
            message: message.to_string(),
        }
    }

    /// Create an invalid policy file error
    pub fn invalid_policy_file(message: impl ToString) -> Self {
        Self::InvalidPolicyFile {
            message: message.to_string(),
        }
    }

    /// Create a malformed archive error
    pub fn malformed_archive(message: impl ToString) -> Self {
        Self::MalformedArchive {
            message: message.to_string(),
        }
    }

    /// Create an encryption error
    pub fn encryption(message: impl ToString) -> Self {
        Self::Encryption {
            message: message.to_string(),
        }
    }
}
