//! Compares a workspace's present-day files against its last indexed
//! catalog snapshot. `git diff`/`git ls-files` is the primary, cheap path;
//! a full rehash is the fallback when `git` is unavailable or the
//! workspace isn't a repository.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use sha2::{Digest, Sha256};

use memoryhub_types::DriftMethod;

const SUPPORTED_SUFFIXES: &[&str] = &["py", "js", "jsx", "ts", "tsx", "dart"];

#[derive(Debug, Clone, PartialEq)]
pub struct DriftResult {
    pub method: DriftMethod,
    pub changed_files: Vec<String>,
    pub drift_score: f64,
    pub total_files: usize,
}

/// `known_files` is `(path, content_hash)` from the last indexed snapshot.
pub fn detect_drift(workspace_root: &Path, known_files: &[(String, String)]) -> DriftResult {
    match git_diff_drift(workspace_root, known_files) {
        Some(result) => result,
        None => hash_compare_drift(workspace_root, known_files),
    }
}

fn git_diff_drift(workspace_root: &Path, known_files: &[(String, String)]) -> Option<DriftResult> {
    let diffed = run_git(workspace_root, &["diff", "--name-only", "HEAD"])?;
    let untracked = run_git(
        workspace_root,
        &["ls-files", "--others", "--exclude-standard"],
    )?;

    let mut changed: BTreeSet<String> = BTreeSet::new();
    for line in diffed.lines().chain(untracked.lines()) {
        let path = line.trim();
        if !path.is_empty() && has_supported_suffix(path) {
            changed.insert(path.to_string());
        }
    }

    let known_count = known_files.len().max(1) as f64;
    let changed_files: Vec<String> = changed.into_iter().collect();
    let drift_score = (changed_files.len() as f64 / known_count).min(1.0);

    Some(DriftResult {
        method: DriftMethod::GitDiff,
        changed_files,
        drift_score,
        total_files: known_files.len(),
    })
}

fn run_git(workspace_root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(workspace_root)
        .args(args)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

fn hash_compare_drift(workspace_root: &Path, known_files: &[(String, String)]) -> DriftResult {
    let mut current: BTreeSet<String> = BTreeSet::new();
    let mut changed = BTreeSet::new();
    let mut all_keys: BTreeSet<String> = known_files.iter().map(|(p, _)| p.clone()).collect();

    for (path, known_hash) in known_files {
        let full = workspace_root.join(path);
        match fs::read(&full) {
            Ok(bytes) => {
                current.insert(path.clone());
                let hash = format!("{:x}", Sha256::digest(&bytes));
                if &hash != known_hash {
                    changed.insert(path.clone());
                }
            }
            Err(_) => {
                changed.insert(path.clone());
            }
        }
    }

    // Newly-present supported files not in the last snapshot also count as drift.
    if let Ok(present) = walk_supported_files(workspace_root) {
        for path in present {
            if !all_keys.contains(&path) {
                all_keys.insert(path.clone());
                changed.insert(path);
            }
        }
    }

    let total_keys = all_keys.len().max(1) as f64;
    let changed_files: Vec<String> = changed.into_iter().collect();
    let drift_score = changed_files.len() as f64 / total_keys;

    tracing::debug!(
        method = "hash_compare",
        changed = changed_files.len(),
        "git diff unavailable, fell back to content hash comparison"
    );

    DriftResult {
        method: DriftMethod::HashCompare,
        changed_files,
        drift_score,
        total_files: known_files.len(),
    }
}

fn has_supported_suffix(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .map(|suffix| SUPPORTED_SUFFIXES.contains(&suffix))
        .unwrap_or(false)
}

fn walk_supported_files(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    if root.is_dir() {
        visit(root, root, &mut out)?;
    }
    Ok(out)
}

fn visit(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n == ".git" || n == "node_modules")
                .unwrap_or(false)
            {
                continue;
            }
            visit(root, &path, out)?;
            continue;
        }
        if let Some(suffix) = path.extension().and_then(|s| s.to_str()) {
            if SUPPORTED_SUFFIXES.contains(&suffix) {
                if let Ok(relative) = path.strip_prefix(root) {
                    out.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_compare_flags_changed_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), b"import os\n").unwrap();

        let stale_hash = format!("{:x}", Sha256::digest(b"import sys\n"));
        let known = vec![
            ("a.py".to_string(), stale_hash),
            ("gone.py".to_string(), "deadbeef".to_string()),
        ];
        let result = hash_compare_drift(dir.path(), &known);
        assert_eq!(result.method, DriftMethod::HashCompare);
        assert!(result.changed_files.contains(&"a.py".to_string()));
        assert!(result.changed_files.contains(&"gone.py".to_string()));
    }

    #[test]
    fn hash_compare_reports_zero_drift_when_nothing_moved() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), b"import os\n").unwrap();
        let hash = format!("{:x}", Sha256::digest(b"import os\n"));
        let known = vec![("a.py".to_string(), hash)];
        let result = hash_compare_drift(dir.path(), &known);
        assert_eq!(result.drift_score, 0.0);
        assert!(result.changed_files.is_empty());
    }

    #[test]
    fn hash_compare_counts_newly_present_files_as_drift() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), b"import os\n").unwrap();
        fs::write(dir.path().join("new.py"), b"import sys\n").unwrap();
        let hash = format!("{:x}", Sha256::digest(b"import os\n"));
        let known = vec![("a.py".to_string(), hash)];
        let result = hash_compare_drift(dir.path(), &known);
        assert!(result.changed_files.contains(&"new.py".to_string()));
    }

    #[test]
    fn non_repository_falls_back_to_hash_compare() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), b"import os\n").unwrap();
        let hash = format!("{:x}", Sha256::digest(b"import os\n"));
        let result = detect_drift(dir.path(), &[("a.py".to_string(), hash)]);
        assert_eq!(result.method, DriftMethod::HashCompare);
    }
}
