//! Common test helpers for tresor-git integration tests
//!
//! Provides a bare repository standing in for the remote, seeded with one
//! commit on `main`, plus helpers that inspect it or push to it from an
//! independent clone.

use git2::{Repository, Signature};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tresor_git::{Credentials, RemoteSpec};

pub const BRANCH: &str = "main";

pub const SEED_POLICY: &str = "creation_rules:\n  - age: age1example\n";

/// Bare repository acting as the remote
pub struct RemoteFixture {
    _dir: TempDir,
    path: PathBuf,
}

#[allow(dead_code)]
impl RemoteFixture {
    /// Bare repository whose `main` holds `.sops.yaml`
    pub fn new() -> Self {
        Self::with_files(&[(".sops.yaml", SEED_POLICY)])
    }

    /// Bare repository whose `main` holds the given top-level files
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("remote.git");
        let repo = Repository::init_bare(&path).unwrap();

        let tree_id = {
            let mut builder = repo.treebuilder(None).unwrap();
            for (name, content) in files {
                let blob = repo.blob(content.as_bytes()).unwrap();
                builder.insert(name, blob, 0o100644).unwrap();
            }
            builder.write().unwrap()
        };
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("seed", "seed@example.com").unwrap();
        repo.commit(Some("refs/heads/main"), &sig, &sig, "seed", &tree, &[])
            .unwrap();
        repo.set_head("refs/heads/main").unwrap();

        Self { _dir: dir, path }
    }

    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn spec(&self) -> RemoteSpec {
        RemoteSpec::new(self.url(), BRANCH, Credentials::anonymous())
    }

    fn open(&self) -> Repository {
        Repository::open_bare(&self.path).unwrap()
    }

    /// Number of commits reachable from `main`
    pub fn commit_count(&self) -> usize {
        let repo = self.open();
        let mut walk = repo.revwalk().unwrap();
        walk.push_ref("refs/heads/main").unwrap();
        walk.count()
    }

    /// Content of `path` at the tip of `main`
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let repo = self.open();
        let tree = repo
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_tree()
            .unwrap();
        let entry = tree.get_path(Path::new(path)).ok()?;
        let blob = repo.find_blob(entry.id()).unwrap();
        Some(blob.content().to_vec())
    }

    /// (message, author name, author email) of the tip of `main`
    pub fn head_commit(&self) -> (String, String, String) {
        let repo = self.open();
        let commit = repo
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        let author = commit.author();
        (
            commit.message().unwrap_or_default().to_string(),
            author.name().unwrap_or_default().to_string(),
            author.email().unwrap_or_default().to_string(),
        )
    }

    /// Commit and push a change from a separate clone, as another writer would
    pub fn push_external_change(&self, path: &str, content: &str) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::clone(&self.url(), dir.path()).unwrap();

        let target = dir.path().join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&target, content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(path)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let parent = repo.head().unwrap().peel_to_commit().unwrap();
        let sig = Signature::now("someone-else", "else@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "external", &tree, &[&parent])
            .unwrap();

        let mut origin = repo.find_remote("origin").unwrap();
        origin
            .push(&["refs/heads/main:refs/heads/main"], None)
            .unwrap();
    }
}
