//! SOPS-format encryption for Tresor archives
//!
//! This crate turns a plaintext YAML credential into a self-describing
//! encrypted document:
//! - [`EncryptionPolicy`] selects recipients and field selector for a path
//!   from a `.sops.yaml` rule set
//! - [`StructuredEncryptor`] encrypts the selected leaves under a fresh data
//!   key wrapped for every age recipient
//! - [`ArchiveMetadata`] reads the freshness timestamp back out of an archive
//!
//! The output is readable by the standard `sops` tooling. Decryption is not
//! provided.

mod cipher;
mod encryption;
mod error;
mod keywrap;
mod metadata;
mod policy;

pub use encryption::{EncryptedDocument, StructuredEncryptor};
pub use error::{Error, Result};
pub use metadata::{AgeRecipientMetadata, ArchiveMetadata, KeyGroupMetadata, SopsMetadata};
pub use policy::{CreationRule, EncryptionPolicy, KeyGroup, KeyGroupSpec, PolicyFile, ResolvedPolicy};

/// Name of the policy file at the repository root
pub const POLICY_FILE_NAME: &str = ".sops.yaml";

/// Format version written into `sops.version`
pub const SOPS_FORMAT_VERSION: &str = "3.7.3";
