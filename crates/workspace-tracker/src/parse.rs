//! Parsers for git plumbing output.

use crate::types::FileChangeKind;

/// Hash of the empty tree, used as the diff base before the first commit.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Untracked files larger than this get a marker instead of a diff.
pub const MAX_SYNTHETIC_DIFF_BYTES: usize = 1024 * 1024;

/// Prefix scanned for NUL bytes when deciding if content is binary.
const BINARY_SNIFF_LEN: usize = 8000;

/// Separator placed before the index-only part of a partially staged diff.
pub const STAGED_SEPARATOR: &str = "# staged changes";

/// One record of `git status --porcelain=v1 -z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PorcelainEntry {
    pub index: char,
    pub worktree: char,
    pub path: String,
    pub original_path: Option<String>,
}

impl PorcelainEntry {
    pub fn is_untracked(&self) -> bool {
        self.index == '?' && self.worktree == '?'
    }

    pub fn is_staged(&self) -> bool {
        !matches!(self.index, ' ' | '?' | '!')
    }

    pub fn has_worktree_changes(&self) -> bool {
        !matches!(self.worktree, ' ' | '?' | '!')
    }

    /// Staged and also modified again in the working tree.
    pub fn is_partially_staged(&self) -> bool {
        self.is_staged() && self.has_worktree_changes()
    }

    pub fn kind(&self) -> FileChangeKind {
        if self.is_untracked() {
            FileChangeKind::Untracked
        } else if self.index == 'R' || self.worktree == 'R' {
            FileChangeKind::Renamed
        } else if self.index == 'D' || self.worktree == 'D' {
            FileChangeKind::Deleted
        } else if self.index == 'A' {
            FileChangeKind::Added
        } else {
            FileChangeKind::Modified
        }
    }
}

/// Parse NUL-separated porcelain v1 output. Ignored entries are skipped.
///
/// Rename and copy records are followed by a second field holding the
/// source path.
pub fn parse_porcelain_z(output: &str) -> Vec<PorcelainEntry> {
    let mut entries = Vec::new();
    let mut fields = output.split('\0');

    while let Some(record) = fields.next() {
        if record.len() < 4 {
            continue;
        }
        let mut chars = record.chars();
        let (Some(index), Some(worktree)) = (chars.next(), chars.next()) else {
            continue;
        };
        let path = record[3..].to_string();

        let original_path = if matches!(index, 'R' | 'C') {
            fields.next().map(str::to_string)
        } else {
            None
        };

        if index == '!' {
            continue;
        }

        entries.push(PorcelainEntry {
            index,
            worktree,
            path,
            original_path,
        });
    }

    entries
}

/// One record of `git diff --numstat -z --no-renames`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumstatEntry {
    pub path: String,
    /// `None` for binary files.
    pub additions: Option<u32>,
    pub deletions: Option<u32>,
}

impl NumstatEntry {
    pub fn is_binary(&self) -> bool {
        self.additions.is_none() || self.deletions.is_none()
    }
}

pub fn parse_numstat_z(output: &str) -> Vec<NumstatEntry> {
    output
        .split('\0')
        .filter_map(|record| {
            let record = record.trim_start_matches('\n');
            let mut parts = record.splitn(3, '\t');
            let additions = parts.next()?;
            let deletions = parts.next()?;
            let path = parts.next()?;
            if path.is_empty() {
                return None;
            }
            Some(NumstatEntry {
                path: path.to_string(),
                additions: additions.parse().ok(),
                deletions: deletions.parse().ok(),
            })
        })
        .collect()
}

/// Parse `git rev-list --left-right --count A...B` into (ahead, behind).
pub fn parse_ahead_behind(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

/// Line counts extracted from a unified patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub additions: u32,
    pub deletions: u32,
    pub binary: bool,
}

impl PatchStats {
    pub fn merge(&mut self, other: PatchStats) {
        self.additions += other.additions;
        self.deletions += other.deletions;
        self.binary |= other.binary;
    }
}

/// Count added and removed lines inside hunks.
pub fn count_patch(patch: &str) -> PatchStats {
    let mut stats = PatchStats::default();
    let mut in_hunk = false;

    for line in patch.lines() {
        if line.starts_with("diff --git ") {
            in_hunk = false;
        } else if line.starts_with("@@") {
            in_hunk = true;
        } else if line.starts_with("Binary files ") || line == "GIT binary patch" {
            stats.binary = true;
        } else if in_hunk {
            if line.starts_with('+') {
                stats.additions += 1;
            } else if line.starts_with('-') {
                stats.deletions += 1;
            }
        }
    }

    stats
}

pub fn looks_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

/// Build a `new file` patch for an untracked path.
///
/// Binary content and files over [`MAX_SYNTHETIC_DIFF_BYTES`] produce a
/// one-line marker with zero counts.
pub fn synthetic_new_file_diff(path: &str, content: &[u8]) -> (String, PatchStats) {
    if content.len() > MAX_SYNTHETIC_DIFF_BYTES {
        let marker = format!(
            "Large file {path} ({} bytes) omitted\n",
            content.len()
        );
        return (marker, PatchStats::default());
    }
    if looks_binary(content) {
        let marker = format!("Binary files /dev/null and b/{path} differ\n");
        return (
            marker,
            PatchStats {
                binary: true,
                ..PatchStats::default()
            },
        );
    }

    let text = String::from_utf8_lossy(content);
    let lines: Vec<&str> = text.lines().collect();

    let mut diff = format!(
        "diff --git a/{path} b/{path}\nnew file mode 100644\n--- /dev/null\n+++ b/{path}\n"
    );
    if !lines.is_empty() {
        diff.push_str(&format!("@@ -0,0 +1,{} @@\n", lines.len()));
        for line in &lines {
            diff.push('+');
            diff.push_str(line);
            diff.push('\n');
        }
        if !text.ends_with('\n') {
            diff.push_str("\\ No newline at end of file\n");
        }
    }

    let stats = PatchStats {
        additions: lines.len() as u32,
        ..PatchStats::default()
    };
    (diff, stats)
}

/// Append the index-only patch below the staged separator.
pub fn append_staged(diff: &mut String, staged_patch: &str) {
    if staged_patch.trim().is_empty() {
        return;
    }
    if !diff.is_empty() && !diff.ends_with('\n') {
        diff.push('\n');
    }
    diff.push_str(STAGED_SEPARATOR);
    diff.push('\n');
    diff.push_str(staged_patch);
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Porcelain
    // =========================================================================

    #[test]
    fn porcelain_basic_records() {
        let output = " M src/lib.rs\0A  new.rs\0?? notes.txt\0 D gone.rs\0";
        let entries = parse_porcelain_z(output);

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].path, "src/lib.rs");
        assert_eq!(entries[0].kind(), FileChangeKind::Modified);
        assert!(!entries[0].is_staged());

        assert_eq!(entries[1].kind(), FileChangeKind::Added);
        assert!(entries[1].is_staged());

        assert_eq!(entries[2].kind(), FileChangeKind::Untracked);
        assert!(!entries[2].is_staged());

        assert_eq!(entries[3].kind(), FileChangeKind::Deleted);
    }

    #[test]
    fn porcelain_rename_consumes_source_field() {
        let output = "R  after.rs\0before.rs\0 M other.rs\0";
        let entries = parse_porcelain_z(output);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind(), FileChangeKind::Renamed);
        assert_eq!(entries[0].path, "after.rs");
        assert_eq!(entries[0].original_path.as_deref(), Some("before.rs"));
        assert_eq!(entries[1].path, "other.rs");
    }

    #[test]
    fn porcelain_partial_staging() {
        let entries = parse_porcelain_z("MM both.rs\0");
        assert!(entries[0].is_partially_staged());
    }

    #[test]
    fn porcelain_keeps_paths_with_spaces() {
        let entries = parse_porcelain_z("?? dir/with space.txt\0");
        assert_eq!(entries[0].path, "dir/with space.txt");
    }

    #[test]
    fn porcelain_skips_ignored() {
        let entries = parse_porcelain_z("!! target/\0 M a.rs\0");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "a.rs");
    }

    // =========================================================================
    // Numstat / rev-list
    // =========================================================================

    #[test]
    fn numstat_text_and_binary() {
        let entries = parse_numstat_z("3\t1\tsrc/a.rs\0-\t-\timg.png\0");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].additions, Some(3));
        assert_eq!(entries[0].deletions, Some(1));
        assert!(!entries[0].is_binary());
        assert!(entries[1].is_binary());
    }

    #[test]
    fn ahead_behind_parses_tab_separated() {
        assert_eq!(parse_ahead_behind("2\t5\n"), Some((2, 5)));
        assert_eq!(parse_ahead_behind(""), None);
    }

    // =========================================================================
    // Patches
    // =========================================================================

    #[test]
    fn count_patch_ignores_headers() {
        let patch = "diff --git a/x b/x\nindex 1..2 100644\n--- a/x\n+++ b/x\n@@ -1,2 +1,2 @@\n-old\n+new\n context\n";
        let stats = count_patch(patch);
        assert_eq!(stats.additions, 1);
        assert_eq!(stats.deletions, 1);
        assert!(!stats.binary);
    }

    #[test]
    fn count_patch_detects_binary() {
        let patch = "diff --git a/x.png b/x.png\nBinary files a/x.png and b/x.png differ\n";
        assert!(count_patch(patch).binary);
    }

    #[test]
    fn synthetic_diff_for_text() {
        let (diff, stats) = synthetic_new_file_diff("foo.txt", b"bar\n");
        assert!(diff.contains("new file"));
        assert!(diff.contains("+bar\n"));
        assert!(!diff.contains("No newline"));
        assert_eq!(stats.additions, 1);
        assert_eq!(stats.deletions, 0);
    }

    #[test]
    fn synthetic_diff_without_trailing_newline() {
        let (diff, stats) = synthetic_new_file_diff("a.txt", b"one\ntwo");
        assert_eq!(stats.additions, 2);
        assert!(diff.ends_with("\\ No newline at end of file\n"));
    }

    #[test]
    fn synthetic_diff_marks_binary_and_large() {
        let (diff, stats) = synthetic_new_file_diff("bin", &[0u8, 1, 2]);
        assert!(stats.binary);
        assert_eq!(stats.additions, 0);
        assert_eq!(diff.lines().count(), 1);

        let big = vec![b'a'; MAX_SYNTHETIC_DIFF_BYTES + 1];
        let (diff, stats) = synthetic_new_file_diff("big.txt", &big);
        assert_eq!(stats.additions, 0);
        assert_eq!(diff.lines().count(), 1);
    }

    #[test]
    fn append_staged_adds_separator() {
        let mut diff = "working".to_string();
        append_staged(&mut diff, "staged\n");
        assert_eq!(diff, "working\n# staged changes\nstaged\n");

        let mut untouched = "working\n".to_string();
        append_staged(&mut untouched, "  \n");
        assert_eq!(untouched, "working\n");
    }
}
