//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Tresor - encrypted git backups of control-plane kubeconfigs
#[derive(Parser, Debug)]
#[command(name = "tresor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch KubeadmControlPlane objects and back up their kubeconfigs
    Run(RunArgs),

    /// Back up a single kubeconfig file
    Backup(BackupArgs),

    /// Show which creation rule a repository path resolves to
    Policy(PolicyArgs),

    /// Show version information
    Version(VersionArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only watch this namespace (default: all namespaces)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Hold a Lease before reconciling so only one replica pushes backups
    #[arg(long)]
    pub leader_elect: bool,

    /// Namespace of the leader Lease (default: the client's namespace)
    #[arg(long, env = "POD_NAMESPACE")]
    pub leader_election_namespace: Option<String>,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Namespace of the control plane, e.g. cluster-a-prod
    #[arg(long)]
    pub namespace: String,

    /// Name of the control plane
    #[arg(long)]
    pub name: String,

    /// Kubeconfig to back up
    #[arg(long)]
    pub file: Utf8PathBuf,

    /// Creation time of the credential (RFC3339). Defaults to the file's mtime.
    #[arg(long)]
    pub observed_at: Option<String>,
}

#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Repository-relative path, e.g. prod/a/cp.yaml
    pub path: String,

    /// Policy file to resolve against
    #[arg(long, default_value = ".sops.yaml")]
    pub policy_file: Utf8PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
