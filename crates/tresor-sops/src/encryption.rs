//! Structured encryption of YAML documents
//!
//! Only leaf values are encrypted; keys and document shape stay readable so
//! diffs in the backup repository show which fields changed.

use crate::cipher::{encrypt_value, DataKey, ValueType};
use crate::error::{Error, Result};
use crate::keywrap::wrap_for_group;
use crate::metadata::{AgeRecipientMetadata, KeyGroupMetadata, SopsMetadata, METADATA_KEY};
use crate::policy::ResolvedPolicy;
use crate::SOPS_FORMAT_VERSION;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_yaml_ng::{Mapping, Value};
use sha2::{Digest, Sha512};
use tracing::debug;

/// Encrypts plaintext YAML under a resolved policy
#[derive(Debug, Clone, Default)]
pub struct StructuredEncryptor;

impl StructuredEncryptor {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt `plaintext` for the recipients of `policy`.
    ///
    /// Every call draws a fresh data key and fresh IVs, so two encryptions of
    /// the same input never produce the same bytes.
    pub fn encrypt(&self, plaintext: &[u8], policy: &ResolvedPolicy) -> Result<EncryptedDocument> {
        let tree = parse_plaintext(plaintext)?;

        if policy.recipient_count() == 0 {
            return Err(Error::key_wrap(
                "policy has no recipients, the archive could never be decrypted",
            ));
        }

        let data_key = DataKey::generate();
        let groups = policy
            .key_groups
            .iter()
            .map(|group| wrap_for_group(&data_key, &group.recipients))
            .collect::<Result<Vec<_>>>()?;

        let mut walker = TreeWalker::new(&data_key, policy.encrypted_regex.as_ref());
        let branches = walker.walk_mapping(tree, &mut Vec::new())?;

        if let Some(regex) = &policy.encrypted_regex {
            if walker.encrypted == 0 {
                return Err(Error::NothingEncrypted {
                    regex: regex.as_str().to_string(),
                });
            }
        }

        let last_modified = Utc::now();
        // sops authenticates the MAC against the second-precision timestamp.
        let mac_digest = hex::encode_upper(walker.mac.finalize());
        let mac = encrypt_value(
            &data_key,
            mac_digest.as_bytes(),
            ValueType::Str,
            &last_modified.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;

        let (age, key_groups): (Vec<AgeRecipientMetadata>, Vec<KeyGroupMetadata>) =
            if groups.len() == 1 {
                (groups.into_iter().flatten().collect(), Vec::new())
            } else {
                let key_groups = groups
                    .into_iter()
                    .map(|age| KeyGroupMetadata { age })
                    .collect();
                (Vec::new(), key_groups)
            };

        let metadata = SopsMetadata {
            key_groups,
            age,
            lastmodified: last_modified.to_rfc3339_opts(SecondsFormat::Nanos, true),
            mac,
            encrypted_regex: policy
                .encrypted_regex
                .as_ref()
                .map(|r| r.as_str().to_string()),
            version: SOPS_FORMAT_VERSION.to_string(),
            ..Default::default()
        };

        debug!(
            encrypted = walker.encrypted,
            recipients = policy.recipient_count(),
            "Encrypted document"
        );

        Ok(EncryptedDocument {
            branches,
            metadata,
            last_modified,
            encrypted_values: walker.encrypted,
        })
    }
}

/// Encrypted tree plus its `sops` metadata
#[derive(Debug, Clone)]
pub struct EncryptedDocument {
    branches: Mapping,
    metadata: SopsMetadata,
    last_modified: DateTime<Utc>,
    encrypted_values: usize,
}

impl EncryptedDocument {
    /// Wall-clock time of encryption, as written to `sops.lastmodified`
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn metadata(&self) -> &SopsMetadata {
        &self.metadata
    }

    /// Number of leaves replaced by ciphertext
    pub fn encrypted_values(&self) -> usize {
        self.encrypted_values
    }

    /// Serialize as YAML with the `sops` block appended after the payload keys
    pub fn to_yaml(&self) -> Result<String> {
        let mut document = self.branches.clone();
        let metadata = serde_yaml_ng::to_value(&self.metadata).map_err(Error::encryption)?;
        document.insert(Value::String(METADATA_KEY.to_string()), metadata);
        serde_yaml_ng::to_string(&Value::Mapping(document)).map_err(Error::encryption)
    }
}

fn parse_plaintext(plaintext: &[u8]) -> Result<Mapping> {
    let value: Value = serde_yaml_ng::from_slice(plaintext).map_err(Error::malformed_input)?;

    match value {
        Value::Mapping(mapping) => {
            if mapping.contains_key(METADATA_KEY) {
                return Err(Error::malformed_input(
                    "document already contains a sops metadata block",
                ));
            }
            Ok(mapping)
        }
        other => Err(Error::malformed_input(format!(
            "top level must be a mapping, found {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Depth-first walk encrypting selected leaves and hashing all of them
struct TreeWalker<'a> {
    key: &'a DataKey,
    selector: Option<&'a Regex>,
    mac: Sha512,
    encrypted: usize,
}

impl<'a> TreeWalker<'a> {
    fn new(key: &'a DataKey, selector: Option<&'a Regex>) -> Self {
        Self {
            key,
            selector,
            mac: Sha512::new(),
            encrypted: 0,
        }
    }

    fn walk_mapping(&mut self, mapping: Mapping, path: &mut Vec<String>) -> Result<Mapping> {
        let mut out = Mapping::with_capacity(mapping.len());
        for (key, value) in mapping {
            path.push(key_segment(&key)?);
            let value = self.walk(value, path)?;
            path.pop();
            out.insert(key, value);
        }
        Ok(out)
    }

    fn walk(&mut self, value: Value, path: &mut Vec<String>) -> Result<Value> {
        match value {
            Value::Mapping(mapping) => Ok(Value::Mapping(self.walk_mapping(mapping, path)?)),
            // Items share the key path of their sequence.
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.walk(item, path))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Value::Null => Ok(Value::Null),
            Value::Tagged(tagged) => Err(Error::malformed_input(format!(
                "tagged value {} at '{}' is not supported",
                tagged.tag,
                path.join(":")
            ))),
            scalar => self.leaf(scalar, path),
        }
    }

    fn leaf(&mut self, value: Value, path: &[String]) -> Result<Value> {
        let (plaintext, value_type) = match &value {
            Value::String(s) => (s.clone(), ValueType::Str),
            Value::Bool(b) => (if *b { "True" } else { "False" }.to_string(), ValueType::Bool),
            Value::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() => (f.to_string(), ValueType::Float),
                _ => (n.to_string(), ValueType::Int),
            },
            _ => return Ok(value),
        };

        self.mac.update(plaintext.as_bytes());

        if !self.selected(path) {
            return Ok(value);
        }

        let additional_data = format!("{}:", path.join(":"));
        let envelope = encrypt_value(self.key, plaintext.as_bytes(), value_type, &additional_data)?;
        self.encrypted += 1;
        Ok(Value::String(envelope))
    }

    fn selected(&self, path: &[String]) -> bool {
        match self.selector {
            None => true,
            Some(regex) => path.iter().any(|segment| regex.is_match(segment)),
        }
    }
}

/// Mapping keys become path segments for selection and additional data
fn key_segment(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(Error::malformed_input(format!(
            "mapping keys must be scalars, found {}",
            kind(other)
        ))),
    }
}
