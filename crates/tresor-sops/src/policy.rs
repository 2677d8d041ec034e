//! `.sops.yaml` creation rules and path-based policy resolution

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parsed `.sops.yaml`.
///
/// Only the fields relevant to age encryption are read; any other keys
/// (`pgp`, `kms`, `destination_rules`, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyFile {
    /// `None` when the file has no `creation_rules` key at all
    #[serde(default)]
    pub creation_rules: Option<Vec<CreationRule>>,
}

/// One entry of `creation_rules`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreationRule {
    #[serde(default)]
    pub path_regex: String,

    /// Comma-separated age recipients, used when `key_groups` is empty
    #[serde(default)]
    pub age: String,

    #[serde(default)]
    pub key_groups: Vec<KeyGroupSpec>,

    #[serde(default)]
    pub encrypted_regex: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyGroupSpec {
    #[serde(default)]
    pub age: Vec<String>,
}

impl PolicyFile {
    /// Parse policy file content; blank content is a file without rules
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(content).map_err(Error::invalid_policy_file)
    }
}

/// Age recipients that together receive one copy of the data key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyGroup {
    pub recipients: Vec<String>,
}

impl KeyGroup {
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Outcome of resolving a path against the rule set
#[derive(Debug, Clone)]
pub struct ResolvedPolicy {
    pub key_groups: Vec<KeyGroup>,
    /// Leaves are encrypted when a key on their path matches; `None` means all
    pub encrypted_regex: Option<Regex>,
}

impl ResolvedPolicy {
    /// Total recipients across all groups
    pub fn recipient_count(&self) -> usize {
        self.key_groups.iter().map(|g| g.recipients.len()).sum()
    }
}

#[derive(Debug, Clone)]
enum PathMatcher {
    Any,
    Pattern(Regex),
}

impl PathMatcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Pattern(regex) => regex.is_match(path),
        }
    }
}

#[derive(Debug, Clone)]
struct RuleOutcome {
    key_groups: Vec<KeyGroup>,
    encrypted_regex: Option<Regex>,
}

/// Ordered rule set; the first rule whose matcher accepts the path wins
#[derive(Debug, Clone, Default)]
pub struct EncryptionPolicy {
    rules: Vec<(PathMatcher, RuleOutcome)>,
}

impl EncryptionPolicy {
    /// Parse and compile a `.sops.yaml` document
    pub fn from_yaml(content: &str) -> Result<Self> {
        Self::from_policy_file(&PolicyFile::from_yaml(content)?)
    }

    /// Compile every rule up front so a broken pattern is reported even
    /// when an earlier rule would have matched.
    pub fn from_policy_file(file: &PolicyFile) -> Result<Self> {
        let rules = file
            .creation_rules
            .iter()
            .flatten()
            .map(compile_rule)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Select the rule for `path`.
    ///
    /// Rules are tried in declared order; an empty `path_regex` matches
    /// unconditionally, otherwise the pattern is searched anywhere in `path`.
    pub fn resolve(&self, path: &str) -> Result<ResolvedPolicy> {
        let (index, outcome) = self
            .rules
            .iter()
            .enumerate()
            .find(|(_, (matcher, _))| matcher.matches(path))
            .map(|(i, (_, outcome))| (i, outcome))
            .ok_or_else(|| Error::no_matching_policy(path))?;

        debug!(path = %path, rule = index, "Resolved creation rule");
        Ok(ResolvedPolicy {
            key_groups: outcome.key_groups.clone(),
            encrypted_regex: outcome.encrypted_regex.clone(),
        })
    }
}

fn compile_rule(rule: &CreationRule) -> Result<(PathMatcher, RuleOutcome)> {
    let matcher = if rule.path_regex.is_empty() {
        PathMatcher::Any
    } else {
        PathMatcher::Pattern(compile(&rule.path_regex)?)
    };

    let encrypted_regex = if rule.encrypted_regex.is_empty() {
        None
    } else {
        Some(compile(&rule.encrypted_regex)?)
    };

    let key_groups = if rule.key_groups.is_empty() {
        // An empty implicit group is kept; encryption rejects it later.
        let recipients = rule
            .age
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect();
        vec![KeyGroup::new(recipients)]
    } else {
        rule.key_groups
            .iter()
            .map(|group| KeyGroup::new(group.age.clone()))
            .collect()
    };

    Ok((
        matcher,
        RuleOutcome {
            key_groups,
            encrypted_regex,
        },
    ))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e))
}
