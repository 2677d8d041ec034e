//! The `sops` metadata block and reading it back from archives

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;

/// Top-level key holding the metadata in an encrypted document
pub const METADATA_KEY: &str = "sops";

/// One age recipient and its armored copy of the data key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRecipientMetadata {
    pub recipient: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGroupMetadata {
    #[serde(default)]
    pub age: Vec<AgeRecipientMetadata>,
}

/// Metadata block as emitted by sops 3.7 for age-only documents.
///
/// Single-group documents list recipients under `age`; multi-group documents
/// use `key_groups` instead. The unused key-source lists are emitted empty
/// so the block keeps the shape `sops` writes itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SopsMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_groups: Vec<KeyGroupMetadata>,
    #[serde(default)]
    pub kms: Vec<Value>,
    #[serde(default)]
    pub gcp_kms: Vec<Value>,
    #[serde(default)]
    pub azure_kv: Vec<Value>,
    #[serde(default)]
    pub hc_vault: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub age: Vec<AgeRecipientMetadata>,
    #[serde(default)]
    pub lastmodified: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub pgp: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_regex: Option<String>,
    #[serde(default)]
    pub version: String,
}

impl SopsMetadata {
    /// All age recipients, whichever layout the document uses
    pub fn age_recipients(&self) -> impl Iterator<Item = &AgeRecipientMetadata> {
        self.age
            .iter()
            .chain(self.key_groups.iter().flat_map(|g| g.age.iter()))
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.lastmodified)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Read-only view of an existing archive's metadata
pub struct ArchiveMetadata;

impl ArchiveMetadata {
    /// Parse the `sops` block of an archive.
    ///
    /// `Ok(None)` when the document has no usable metadata block; an error
    /// only when the bytes are not YAML at all.
    pub fn read(archive: &[u8]) -> Result<Option<SopsMetadata>> {
        let document: Value = serde_yaml_ng::from_slice(archive).map_err(Error::malformed_archive)?;

        let block = match document.get(METADATA_KEY) {
            Some(block @ Value::Mapping(_)) => block.clone(),
            _ => return Ok(None),
        };
        Ok(serde_yaml_ng::from_value(block).ok())
    }

    /// The archive's `sops.lastmodified`, if present and parsable
    pub fn last_modified(archive: &[u8]) -> Result<Option<DateTime<Utc>>> {
        Ok(Self::read(archive)?.and_then(|metadata| metadata.last_modified()))
    }
}
