//! Policy command: dry-run creation rule resolution

use crate::cli::PolicyArgs;
use anyhow::{Context, Result};
use std::fmt::Write;
use tresor_sops::EncryptionPolicy;

pub fn run(args: PolicyArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.policy_file)
        .with_context(|| format!("Failed to read policy file: {}", args.policy_file))?;

    print!("{}", describe(&content, &args.path)?);
    Ok(())
}

/// Human-readable summary of the rule `path` resolves to
fn describe(policy_yaml: &str, path: &str) -> Result<String> {
    let policy = EncryptionPolicy::from_yaml(policy_yaml)?;
    let resolved = policy.resolve(path)?;

    let mut out = String::new();
    writeln!(out, "Path:            {}", path)?;
    match &resolved.encrypted_regex {
        Some(regex) => writeln!(out, "Encrypted regex: {}", regex.as_str())?,
        None => writeln!(out, "Encrypted regex: (all values)")?,
    }
    for (i, group) in resolved.key_groups.iter().enumerate() {
        writeln!(out, "Key group {}:", i + 1)?;
        if group.is_empty() {
            writeln!(out, "  (no recipients, encryption will fail)")?;
        }
        for recipient in &group.recipients {
            writeln!(out, "  {}", recipient)?;
        }
    }
    Ok(out)
}
