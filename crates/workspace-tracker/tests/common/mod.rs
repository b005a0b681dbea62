#![allow(dead_code)]

use git2::{Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use supervisor_config::TrackerConfig;
use tempfile::TempDir;

/// Whether a usable `git` executable is on this machine.
pub fn git_available() -> bool {
    let exe = std::env::var("GIT_PATH").unwrap_or_else(|_| "git".to_string());
    Command::new(exe)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn tracker_config() -> TrackerConfig {
    TrackerConfig {
        interval_ms: 50,
        command_timeout_secs: 10,
        mailbox_capacity: 8,
        ..TrackerConfig::default()
    }
}

/// Create a temp repo with one committed `README.md`.
pub fn init_test_repo() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let repo_path = dir.path().to_path_buf();
    Repository::init(&repo_path).expect("failed to init repo");

    create_file(&repo_path, "README.md", "# Test Repo\n");
    commit_all(&repo_path, "Initial commit");

    (dir, repo_path)
}

/// Create a temp repo with no commits.
pub fn init_empty_repo() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let repo_path = dir.path().to_path_buf();
    Repository::init(&repo_path).expect("failed to init repo");
    (dir, repo_path)
}

pub fn create_file(repo_path: &Path, name: &str, content: &str) {
    let file_path = repo_path.join(name);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).expect("failed to create parent dirs");
    }
    fs::write(&file_path, content).expect("failed to write file");
}

pub fn stage_path(repo_path: &Path, name: &str) {
    let repo = Repository::open(repo_path).expect("failed to open repo");
    let mut index = repo.index().expect("failed to get index");
    index
        .add_path(Path::new(name))
        .expect("failed to add to index");
    index.write().expect("failed to write index");
}

/// Stage everything and commit, creating the root commit if needed.
pub fn commit_all(repo_path: &Path, message: &str) {
    let repo = Repository::open(repo_path).expect("failed to open repo");
    let mut index = repo.index().expect("failed to get index");
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .expect("failed to add all");
    index.write().expect("failed to write index");

    let tree_id = index.write_tree().expect("failed to write tree");
    let tree = repo.find_tree(tree_id).expect("failed to find tree");
    let sig = Signature::now("Test User", "test@example.com").expect("failed to create sig");

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .expect("failed to commit");
}
