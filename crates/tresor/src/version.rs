//! What this build is and which archive format it writes

use serde::Serialize;
use tresor_sops::SOPS_FORMAT_VERSION;

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: String,

    /// `git describe` of the source tree, `-dirty` when built with local changes
    pub revision: Option<String>,

    pub target: Option<String>,

    /// sops version recorded in every archive's metadata
    pub archive_format: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            revision: option_env!("TRESOR_REVISION").map(String::from),
            target: option_env!("TRESOR_TARGET").map(String::from),
            archive_format: SOPS_FORMAT_VERSION.to_string(),
        }
    }

    /// Whether the binary was built from a tree with uncommitted changes
    pub fn is_dirty(&self) -> bool {
        self.revision.as_deref().is_some_and(|r| r.ends_with("-dirty"))
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tresor {}", self.version)?;
        if let Some(revision) = &self.revision {
            write!(f, " ({})", revision)?;
        }
        write!(f, ", writes sops {} archives", self.archive_format)
    }
}
