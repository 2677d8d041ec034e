//! Mapping a control-plane credential to its archive location

use chrono::{DateTime, Utc};
use std::fmt;
use zeroize::Zeroizing;

/// Archive path for a resource: `<third>/<second>/<name>.yaml`.
///
/// The namespace must split on `-` into exactly three segments
/// (`cluster-a-prod` → `prod/a`); any other count yields `None`. Empty
/// segments are allowed and drop out of the path, so `team--prod` maps to
/// `prod/<name>.yaml`.
pub fn destination_for(namespace: &str, name: &str) -> Option<String> {
    let segments: Vec<&str> = namespace.split('-').collect();
    match segments.as_slice() {
        [_, second, third] => {
            let file = format!("{}.yaml", name);
            let parts: Vec<&str> = [*third, *second, file.as_str()]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect();
            Some(parts.join("/"))
        }
        _ => None,
    }
}

/// One credential to back up; built per trigger and never persisted in clear
pub struct BackupTarget {
    namespace: String,
    name: String,
    payload: Zeroizing<Vec<u8>>,
    observed_at: DateTime<Utc>,
    destination: Option<String>,
}

impl BackupTarget {
    pub fn from_resource(
        namespace: impl Into<String>,
        name: impl Into<String>,
        payload: Vec<u8>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        let destination = destination_for(&namespace, &name);

        Self {
            namespace,
            name,
            payload: Zeroizing::new(payload),
            observed_at,
            destination,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plaintext credential
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Creation time of the credential
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Repository-relative archive path, `None` when the namespace has the wrong shape
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }
}

impl fmt::Debug for BackupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupTarget")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("payload", &format_args!("[REDACTED {} bytes]", self.payload.len()))
            .field("observed_at", &self.observed_at)
            .field("destination", &self.destination)
            .finish()
    }
}
