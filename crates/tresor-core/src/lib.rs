//! # tresor-core
//!
//! Core library for Tresor providing:
//! - Configuration file parsing (config.yaml) with `TRESOR_*` environment overrides
//! - Redacting token type for repository credentials
//! - Error types shared by the configuration layer

pub mod config;
pub mod error;
pub mod security;

pub use config::{
    AuthorConfig, ConfigLoader, ControllerConfig, RepositoryConfig, TresorConfig,
};
pub use error::{Error, Result};
pub use security::Token;
