//! Computes the three snapshot facets from git.

use crate::error::TrackerResult;
use crate::git::GitCommandRunner;
use crate::parse::{
    append_staged, count_patch, parse_ahead_behind, parse_numstat_z, parse_porcelain_z,
    synthetic_new_file_diff, PatchStats, PorcelainEntry, EMPTY_TREE,
};
use crate::types::{DiffSnapshot, FileChange, FileDiff, FilesSnapshot, StatusSnapshot};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const PATCH_ARGS: [&str; 3] = ["diff", "--no-color", "--no-ext-diff"];

struct BranchInfo {
    branch: Option<String>,
    upstream: Option<String>,
    ahead: u32,
    behind: u32,
}

pub(crate) async fn status(git: &GitCommandRunner, dir: &Path) -> TrackerResult<StatusSnapshot> {
    let entries = porcelain(git, dir).await?;
    let info = branch_info(git, dir).await;
    let diff_base = diff_base(git, dir, info.upstream.as_deref()).await;

    let mut files = Vec::with_capacity(entries.len());
    for entry in entries {
        let (diff, stats) = if entry.is_untracked() {
            untracked_patch(dir, &entry.path).await
        } else {
            tracked_patch(git, dir, &diff_base, &entry).await?
        };

        files.push(FileChange {
            kind: entry.kind(),
            staged: entry.is_staged(),
            path: entry.path,
            original_path: entry.original_path,
            additions: stats.additions,
            deletions: stats.deletions,
            diff,
        });
    }

    Ok(StatusSnapshot {
        branch: info.branch,
        upstream: info.upstream,
        ahead: info.ahead,
        behind: info.behind,
        diff_base,
        files,
        updated_at: Utc::now(),
    })
}

pub(crate) async fn files(git: &GitCommandRunner, dir: &Path) -> TrackerResult<FilesSnapshot> {
    let output = git.run(&["ls-files", "-z"], dir).await?;
    let mut files: Vec<String> = output
        .split('\0')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    files.sort();
    files.dedup();

    Ok(FilesSnapshot {
        files,
        updated_at: Utc::now(),
    })
}

pub(crate) async fn diff(git: &GitCommandRunner, dir: &Path) -> TrackerResult<DiffSnapshot> {
    let entries = porcelain(git, dir).await?;
    let upstream = upstream(git, dir).await;
    let diff_base = diff_base(git, dir, upstream.as_deref()).await;

    let partially_staged: HashSet<String> = entries
        .iter()
        .filter(|e| e.is_partially_staged())
        .map(|e| e.path.clone())
        .collect();

    let mut by_path: BTreeMap<String, FileDiff> = BTreeMap::new();

    let output = git
        .run(&["diff", "--numstat", "-z", "--no-renames", diff_base.as_str()], dir)
        .await?;
    for entry in parse_numstat_z(&output) {
        let patch = git
            .run(&path_diff_args(&[diff_base.as_str()], &[entry.path.as_str()]), dir)
            .await?;
        by_path.insert(
            entry.path.clone(),
            FileDiff {
                binary: entry.is_binary(),
                additions: entry.additions.unwrap_or(0),
                deletions: entry.deletions.unwrap_or(0),
                path: entry.path,
                diff: patch,
            },
        );
    }

    let output = git
        .run(&["diff", "--cached", "--numstat", "-z", "--no-renames"], dir)
        .await?;
    for entry in parse_numstat_z(&output) {
        let known = by_path.contains_key(&entry.path);
        if known && !partially_staged.contains(&entry.path) {
            continue;
        }

        let patch = git
            .run(&path_diff_args(&["--cached"], &[entry.path.as_str()]), dir)
            .await?;
        let file = by_path
            .entry(entry.path.clone())
            .or_insert_with(|| FileDiff {
                path: entry.path.clone(),
                additions: 0,
                deletions: 0,
                binary: false,
                diff: String::new(),
            });

        file.additions += entry.additions.unwrap_or(0);
        file.deletions += entry.deletions.unwrap_or(0);
        file.binary |= entry.is_binary();
        if known {
            append_staged(&mut file.diff, &patch);
        } else {
            file.diff = patch;
        }
    }

    Ok(DiffSnapshot {
        diff_base,
        files: by_path.into_values().collect(),
        updated_at: Utc::now(),
    })
}

async fn porcelain(git: &GitCommandRunner, dir: &Path) -> TrackerResult<Vec<PorcelainEntry>> {
    let output = git
        .run(
            &["status", "--porcelain=v1", "-z", "--untracked-files=all"],
            dir,
        )
        .await?;
    Ok(parse_porcelain_z(&output))
}

async fn branch_info(git: &GitCommandRunner, dir: &Path) -> BranchInfo {
    let branch = match git.run(&["rev-parse", "--abbrev-ref", "HEAD"], dir).await {
        Ok(out) => non_empty(out),
        // Unborn branch: HEAD points at a ref that does not exist yet.
        Err(_) => git
            .run(&["symbolic-ref", "--short", "HEAD"], dir)
            .await
            .ok()
            .and_then(non_empty),
    };

    let upstream = upstream(git, dir).await;

    let (ahead, behind) = match upstream {
        Some(_) => git
            .run(
                &["rev-list", "--left-right", "--count", "HEAD...@{upstream}"],
                dir,
            )
            .await
            .ok()
            .and_then(|out| parse_ahead_behind(&out))
            .unwrap_or((0, 0)),
        None => (0, 0),
    };

    BranchInfo {
        branch,
        upstream,
        ahead,
        behind,
    }
}

async fn upstream(git: &GitCommandRunner, dir: &Path) -> Option<String> {
    git.run(
        &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{upstream}"],
        dir,
    )
    .await
    .ok()
    .and_then(non_empty)
}

async fn diff_base(git: &GitCommandRunner, dir: &Path, upstream: Option<&str>) -> String {
    if let Some(upstream) = upstream {
        return upstream.to_string();
    }
    match git.run(&["rev-parse", "--verify", "--quiet", "HEAD"], dir).await {
        Ok(_) => "HEAD".to_string(),
        Err(_) => EMPTY_TREE.to_string(),
    }
}

async fn tracked_patch(
    git: &GitCommandRunner,
    dir: &Path,
    diff_base: &str,
    entry: &PorcelainEntry,
) -> TrackerResult<(String, PatchStats)> {
    let mut paths = vec![entry.path.as_str()];
    if let Some(original) = entry.original_path.as_deref() {
        paths.push(original);
    }

    let mut diff = git.run(&path_diff_args(&[diff_base], &paths), dir).await?;
    let mut stats = count_patch(&diff);

    if entry.is_partially_staged() {
        let staged = git
            .run(&path_diff_args(&["--cached"], &paths), dir)
            .await?;
        stats.merge(count_patch(&staged));
        append_staged(&mut diff, &staged);
    }

    Ok((diff, stats))
}

async fn untracked_patch(dir: &Path, path: &str) -> (String, PatchStats) {
    match tokio::fs::read(dir.join(path)).await {
        Ok(content) => synthetic_new_file_diff(path, &content),
        Err(e) => {
            // Removed between status and read.
            tracing::debug!(path = %path, error = %e, "Skipping unreadable untracked file");
            (String::new(), PatchStats::default())
        }
    }
}

fn path_diff_args<'a>(revs: &[&'a str], paths: &[&'a str]) -> Vec<&'a str> {
    let mut args: Vec<&str> = PATCH_ARGS.to_vec();
    args.extend_from_slice(revs);
    args.push("--");
    args.extend_from_slice(paths);
    args
}

fn non_empty(output: String) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
