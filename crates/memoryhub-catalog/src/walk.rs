//! Recursive workspace enumeration with a fixed exclusion/suffix filter.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    "node_modules",
    "build",
    "dist",
    ".dart_tool",
    ".venv",
    "venv",
    "__pycache__",
];

const SUPPORTED_SUFFIXES: &[&str] = &["py", "js", "jsx", "ts", "tsx", "dart"];

/// Result of one recursive walk: every file visited (for `coverage_pct`'s
/// denominator) and the subset kept for indexing.
pub struct WalkResult {
    pub total_files: usize,
    pub kept: Vec<PathBuf>,
}

pub fn collect_files(root: &Path, max_file_size_bytes: u64) -> Result<WalkResult> {
    let mut result = WalkResult {
        total_files: 0,
        kept: Vec::new(),
    };
    if root.is_dir() {
        visit(root, &mut result, max_file_size_bytes)
            .with_context(|| format!("walking workspace root {}", root.display()))?;
    }
    Ok(result)
}

fn visit(dir: &Path, result: &mut WalkResult, max_file_size_bytes: u64) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if is_excluded(&path) {
                continue;
            }
            visit(&path, result, max_file_size_bytes)?;
            continue;
        }

        if !file_type.is_file() {
            continue;
        }
        result.total_files += 1;

        let Some(suffix) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        if !SUPPORTED_SUFFIXES.contains(&suffix) {
            continue;
        }
        let size = entry.metadata()?.len();
        if size > max_file_size_bytes {
            continue;
        }
        result.kept.push(path);
    }
    Ok(())
}

fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| EXCLUDED_DIRS.contains(&name))
        .unwrap_or(false)
}

/// Infers a coarse language name from a file suffix, for display and for
/// routing import extraction to the Python AST path.
pub fn infer_language(suffix: &str) -> &'static str {
    match suffix {
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "dart" => "dart",
        _ => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_node_modules_and_git() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/dep.js"), b"require('x')").unwrap();
        fs::write(dir.path().join("main.py"), b"import os").unwrap();

        let result = collect_files(dir.path(), 1_000_000).unwrap();
        assert_eq!(result.kept.len(), 1);
        assert!(result.kept[0].ends_with("main.py"));
    }

    #[test]
    fn skips_files_over_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.py"), vec![b'x'; 20]).unwrap();
        let result = collect_files(dir.path(), 10).unwrap();
        assert!(result.kept.is_empty());
        assert_eq!(result.total_files, 1);
    }

    #[test]
    fn unsupported_suffix_counts_toward_total_but_not_kept() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), b"# hi").unwrap();
        let result = collect_files(dir.path(), 1_000_000).unwrap();
        assert_eq!(result.total_files, 1);
        assert!(result.kept.is_empty());
    }
}
