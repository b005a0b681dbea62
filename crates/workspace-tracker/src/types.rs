//! Snapshot types published by the tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a path differs from the diff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Modified,
    Added,
    Deleted,
    Untracked,
    Renamed,
}

/// A changed file in the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the repository root.
    pub path: String,
    /// Previous path for renames.
    pub original_path: Option<String>,
    pub kind: FileChangeKind,
    /// Whether the index holds changes for this path.
    pub staged: bool,
    pub additions: u32,
    pub deletions: u32,
    /// Unified diff for this file.
    pub diff: String,
}

/// Branch information plus every changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub branch: Option<String>,
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    /// The revision diffs are computed against.
    pub diff_base: String,
    pub files: Vec<FileChange>,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn is_clean(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file(&self, path: &str) -> Option<&FileChange> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Sorted list of tracked paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesSnapshot {
    pub files: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Line counts and patch for one file against the diff base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub additions: u32,
    pub deletions: u32,
    pub binary: bool,
    pub diff: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSnapshot {
    pub diff_base: String,
    pub files: Vec<FileDiff>,
    pub updated_at: DateTime<Utc>,
}

impl DiffSnapshot {
    pub fn total_additions(&self) -> u32 {
        self.files.iter().map(|f| f.additions).sum()
    }

    pub fn total_deletions(&self) -> u32 {
        self.files.iter().map(|f| f.deletions).sum()
    }

    pub fn file(&self, path: &str) -> Option<&FileDiff> {
        self.files.iter().find(|f| f.path == path)
    }
}
