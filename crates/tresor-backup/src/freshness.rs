//! Deciding whether an existing archive already covers a credential

use crate::error::Result;
use chrono::{DateTime, Utc};
use tracing::debug;
use tresor_sops::ArchiveMetadata;

/// Decides whether the archived copy makes a new write unnecessary
pub trait FreshnessProbe: Send + Sync {
    /// `Ok(true)` when `existing` already covers a credential created at
    /// `observed_at`; an error when `existing` cannot be interpreted at all
    fn is_up_to_date(&self, existing: &[u8], observed_at: DateTime<Utc>) -> Result<bool>;
}

/// Compares the archive's `sops.lastmodified` against the credential creation time.
///
/// The archive wins only when it was encrypted strictly after the credential
/// was created. YAML without a usable `sops` block is stale; bytes that are
/// not YAML fail with `MalformedArchive` and nothing is overwritten.
#[derive(Debug, Clone, Copy, Default)]
pub struct SopsFreshnessProbe;

impl FreshnessProbe for SopsFreshnessProbe {
    fn is_up_to_date(&self, existing: &[u8], observed_at: DateTime<Utc>) -> Result<bool> {
        match ArchiveMetadata::last_modified(existing)? {
            Some(archived) => Ok(archived > observed_at),
            None => {
                debug!("Existing archive has no sops metadata, treating as stale");
                Ok(false)
            }
        }
    }
}
