//! Common test helpers for tresor-backup integration tests
//!
//! Provides:
//! - A bare git remote seeded with a `.sops.yaml` for a fresh age identity
//! - An orchestrator wired to a scratch clone of that remote
//! - An in-memory credential source

use async_trait::async_trait;
use git2::{Repository, Signature};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tresor_backup::{BackupOrchestrator, CredentialSecret, CredentialSource, Result};
use tresor_git::{CommitIdentity, Credentials, RemoteSpec, RepositoryHandle};

pub const KUBECONFIG: &str = "apiVersion: v1\nkind: Config\nusers:\n- name: admin\n  user:\n    client-key-data: a2V5\n";

pub fn identity() -> CommitIdentity {
    CommitIdentity::new("tresor-operator", "operator@tresor.local")
}

/// Bare remote plus the age identity its policy encrypts to
pub struct BackupFixture {
    _dir: TempDir,
    path: PathBuf,
    pub identity: age::x25519::Identity,
}

#[allow(dead_code)]
impl BackupFixture {
    /// Remote whose policy encrypts `client-key-data` for a new identity
    pub fn new() -> Self {
        let identity = age::x25519::Identity::generate();
        let policy = format!(
            "creation_rules:\n  - path_regex: .*\\.yaml$\n    age: {}\n    encrypted_regex: ^client-key-data$\n",
            identity.to_public()
        );
        Self::with_seed(identity, Some(&policy))
    }

    /// Remote with no `.sops.yaml` at all
    pub fn without_policy() -> Self {
        Self::with_seed(age::x25519::Identity::generate(), None)
    }

    /// Remote with the given policy; `{recipient}` is replaced by the fixture's key
    pub fn with_policy(template: &str) -> Self {
        let identity = age::x25519::Identity::generate();
        let policy = template.replace("{recipient}", &identity.to_public().to_string());
        Self::with_seed(identity, Some(&policy))
    }

    fn with_seed(identity: age::x25519::Identity, policy: Option<&str>) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backups.git");
        let repo = Repository::init_bare(&path).unwrap();

        let tree_id = {
            let mut builder = repo.treebuilder(None).unwrap();
            let readme = repo.blob(b"# kubeconfig backups\n").unwrap();
            builder.insert("README.md", readme, 0o100644).unwrap();
            if let Some(policy) = policy {
                let blob = repo.blob(policy.as_bytes()).unwrap();
                builder.insert(".sops.yaml", blob, 0o100644).unwrap();
            }
            builder.write().unwrap()
        };
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("seed", "seed@example.com").unwrap();
        repo.commit(Some("refs/heads/main"), &sig, &sig, "seed", &tree, &[])
            .unwrap();
        repo.set_head("refs/heads/main").unwrap();

        Self {
            _dir: dir,
            path,
            identity,
        }
    }

    pub fn spec(&self) -> RemoteSpec {
        RemoteSpec::new(
            self.path.to_string_lossy(),
            "main",
            Credentials::anonymous(),
        )
    }

    /// Scratch clone of the remote
    pub fn repository(&self) -> Arc<RepositoryHandle> {
        Arc::new(RepositoryHandle::open_or_clone(self.spec(), None).unwrap())
    }

    /// Orchestrator over a fresh scratch clone
    pub fn orchestrator(&self) -> Arc<BackupOrchestrator> {
        Arc::new(BackupOrchestrator::new(self.repository(), identity()))
    }

    pub fn commit_count(&self) -> usize {
        let repo = Repository::open_bare(&self.path).unwrap();
        let mut walk = repo.revwalk().unwrap();
        walk.push_ref("refs/heads/main").unwrap();
        walk.count()
    }

    pub fn head_message(&self) -> String {
        let repo = Repository::open_bare(&self.path).unwrap();
        let commit = repo
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        commit.message().unwrap_or_default().to_string()
    }

    /// Commit `content` at `path` from a separate clone and push it
    pub fn push_external_change(&self, path: &str, content: &str) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::clone(&self.path.to_string_lossy(), dir.path()).unwrap();

        let file = dir.path().join(path);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&file, content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(path)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let parent = repo.head().unwrap().peel_to_commit().unwrap();
        let sig = Signature::now("someone-else", "else@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "external", &tree, &[&parent])
            .unwrap();

        repo.find_remote("origin")
            .unwrap()
            .push(&["refs/heads/main:refs/heads/main"], None)
            .unwrap();
    }

    pub fn read_file(&self, path: &str) -> Option<String> {
        let repo = Repository::open_bare(&self.path).unwrap();
        let tree = repo
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_tree()
            .unwrap();
        let entry = tree.get_path(Path::new(path)).ok()?;
        let blob = repo.find_blob(entry.id()).unwrap();
        Some(String::from_utf8(blob.content().to_vec()).unwrap())
    }
}

/// In-memory secrets keyed by (namespace, name), recording every lookup
#[derive(Default)]
pub struct FakeCredentialSource {
    secrets: HashMap<(String, String), CredentialSecret>,
    pub lookups: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl FakeCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, namespace: &str, name: &str, secret: CredentialSecret) -> Self {
        self.secrets
            .insert((namespace.to_string(), name.to_string()), secret);
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

#[async_trait]
impl CredentialSource for FakeCredentialSource {
    async fn fetch(&self, namespace: &str, secret_name: &str) -> Result<Option<CredentialSecret>> {
        self.lookups
            .lock()
            .unwrap()
            .push((namespace.to_string(), secret_name.to_string()));
        Ok(self
            .secrets
            .get(&(namespace.to_string(), secret_name.to_string()))
            .cloned())
    }
}
