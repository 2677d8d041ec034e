//! Configuration types
//!
//! Keys are kebab-case in `config.yaml`:
//!
//! ```yaml
//! repository:
//!   url: https://gitlab.example.com/platform/kubeconfigs.git
//!   branch: main
//!   token: glpat-xxxx
//!   clone-dir: /var/lib/tresor/repo
//! author:
//!   name: tresor-operator
//!   email: operator@tresor.local
//! controller:
//!   control-plane-version: v1beta1
//!   requeue-error-secs: 60
//! ```

use crate::error::{Error, Result};
use crate::security::Token;
use camino::Utf8PathBuf;
use serde::Deserialize;

/// Default branch backups are committed to
pub const DEFAULT_BRANCH: &str = "main";

/// Username sent alongside the token when the URL carries none
pub const DEFAULT_USERNAME: &str = "git";

/// Top-level Tresor configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TresorConfig {
    /// Backup repository settings
    pub repository: RepositoryConfig,

    /// Commit author identity
    pub author: AuthorConfig,

    /// Controller runtime settings
    pub controller: ControllerConfig,
}

impl TresorConfig {
    /// Check that everything needed to open the backup repository is present
    pub fn validate(&self) -> Result<()> {
        if self.repository.url.trim().is_empty() {
            return Err(Error::missing_field("repository.url"));
        }
        if self.repository.branch.trim().is_empty() {
            return Err(Error::missing_field("repository.branch"));
        }
        if self.author.name.trim().is_empty() || self.author.email.trim().is_empty() {
            return Err(Error::invalid_config(
                "author.name and author.email must not be empty",
            ));
        }
        if self.controller.control_plane_version.trim().is_empty() {
            return Err(Error::missing_field("controller.control-plane-version"));
        }
        Ok(())
    }
}

/// Backup repository settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RepositoryConfig {
    /// Remote URL (https)
    pub url: String,

    /// Branch backups are committed to
    pub branch: String,

    /// Username presented with the token
    pub username: String,

    /// Access token used for fetch and push
    pub token: Token,

    /// Local clone directory. A scratch directory is used when unset.
    pub clone_dir: Option<Utf8PathBuf>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            branch: DEFAULT_BRANCH.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            token: Token::default(),
            clone_dir: None,
        }
    }
}

/// Fixed identity used for backup commits
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AuthorConfig {
    pub name: String,
    pub email: String,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: "tresor-operator".to_string(),
            email: "operator@tresor.local".to_string(),
        }
    }
}

/// Controller runtime settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ControllerConfig {
    /// API version of `controlplane.cluster.x-k8s.io/KubeadmControlPlane`
    pub control_plane_version: String,

    /// Requeue delay after a non-retryable reconcile failure
    pub requeue_error_secs: u64,

    /// Requeue delay after a transient repository sync failure
    pub requeue_retry_secs: u64,

    /// Deadline for the network calls of one backup attempt
    pub operation_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            control_plane_version: "v1beta1".to_string(),
            requeue_error_secs: 60,
            requeue_retry_secs: 10,
            operation_timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TresorConfig::default();
        assert_eq!(config.repository.branch, "main");
        assert_eq!(config.repository.username, "git");
        assert!(config.repository.clone_dir.is_none());
        assert_eq!(config.author.name, "tresor-operator");
        assert_eq!(config.controller.control_plane_version, "v1beta1");
    }

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let yaml = r#"
repository:
  url: https://git.example.com/backups.git
  clone-dir: /var/lib/tresor
controller:
  requeue-error-secs: 5
"#;
        let config: TresorConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.repository.url, "https://git.example.com/backups.git");
        assert_eq!(config.repository.branch, "main");
        assert_eq!(
            config.repository.clone_dir.as_deref().map(|p| p.as_str()),
            Some("/var/lib/tresor")
        );
        assert_eq!(config.controller.requeue_error_secs, 5);
        assert_eq!(config.controller.operation_timeout_secs, 120);
    }

    #[test]
    fn test_validate_requires_url() {
        let config = TresorConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("repository.url"));
    }

    #[test]
    fn test_validate_rejects_blank_branch() {
        let mut config = TresorConfig::default();
        config.repository.url = "https://git.example.com/backups.git".to_string();
        config.repository.branch = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ok() {
        let mut config = TresorConfig::default();
        config.repository.url = "https://git.example.com/backups.git".to_string();
        assert!(config.validate().is_ok());
    }
}
