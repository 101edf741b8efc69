//! Workspace indexer: walks a project's files and produces a content-hashed
//! [`CatalogSnapshot`] of files and import edges.
//!
//! Nothing here touches the store; `memoryhub-sync`'s catalog worker calls
//! [`build_snapshot`] outside any write transaction and hands the result to
//! `memoryhub_store::replace_catalog_snapshot`.

mod imports;
mod walk;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use memoryhub_types::{CatalogEdge, CatalogFile, CatalogSnapshot};

pub use walk::infer_language;

/// A full workspace scan. `total_files` is every file the walk visited
/// (coverage's denominator); `snapshot.files` is the indexed subset.
pub struct ScanResult {
    pub snapshot: CatalogSnapshot,
    pub total_files: i64,
}

/// Builds a full snapshot of `workspace_root`.
///
/// `_files_hint` names files a caller believes changed since the last
/// snapshot. The reference implementation this indexer is ported from
/// documents an identical parameter on its minimal scanner and always
/// performs a full rescan regardless — this port preserves that exact
/// behavior and the parameter's shape so an incremental mode can be added
/// later without moving the seam.
pub fn build_snapshot(
    workspace_root: &Path,
    max_file_size_bytes: u64,
    _files_hint: Option<&[String]>,
) -> Result<ScanResult> {
    let walked = walk::collect_files(workspace_root, max_file_size_bytes)?;

    let mut files = Vec::with_capacity(walked.kept.len());
    let mut edges = Vec::new();

    for path in &walked.kept {
        let relative = relative_slash_path(workspace_root, path);
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let content_hash = format!("{:x}", Sha256::digest(&bytes));
        let suffix = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let language = infer_language(suffix);
        let text = String::from_utf8_lossy(&bytes);

        for (to_module, confidence, source_type) in imports::extract_imports(&text, language) {
            edges.push(CatalogEdge {
                from_path: relative.clone(),
                to_module,
                confidence,
                source_type,
            });
        }

        files.push(CatalogFile {
            path: relative,
            language: language.to_string(),
            content_hash,
            size_bytes: bytes.len() as i64,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    edges.sort_by(|a, b| (&a.from_path, &a.to_module).cmp(&(&b.from_path, &b.to_module)));
    edges.dedup_by(|a, b| a.from_path == b.from_path && a.to_module == b.to_module);

    let catalog_version = compute_catalog_version(&files, &edges);

    tracing::debug!(
        total_files = walked.total_files,
        indexed_files = files.len(),
        edges = edges.len(),
        "rebuilt catalog snapshot"
    );

    Ok(ScanResult {
        snapshot: CatalogSnapshot {
            catalog_version,
            files,
            edges,
        },
        total_files: walked.total_files as i64,
    })
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

/// `sha256:` over a canonical serialization of the sorted file list (by
/// path) concatenated with the sorted, deduplicated edge list.
fn compute_catalog_version(files: &[CatalogFile], edges: &[CatalogEdge]) -> String {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.path.as_bytes());
        hasher.update(b":");
        hasher.update(file.content_hash.as_bytes());
        hasher.update(b"\n");
    }
    for edge in edges {
        hasher.update(edge.from_path.as_bytes());
        hasher.update(b"->");
        hasher.update(edge.to_module.as_bytes());
        hasher.update(b":");
        hasher.update(edge.source_type.as_str().as_bytes());
        hasher.update(b"\n");
    }
    format!("sha256:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_deterministic_for_the_same_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), b"import os\n").unwrap();
        fs::write(dir.path().join("b.py"), b"from a import os\n").unwrap();

        let first = build_snapshot(dir.path(), 1_000_000, None).unwrap();
        let second = build_snapshot(dir.path(), 1_000_000, None).unwrap();
        assert_eq!(
            first.snapshot.catalog_version,
            second.snapshot.catalog_version
        );
        assert_eq!(first.snapshot.files.len(), 2);
    }

    #[test]
    fn byte_hash_is_insensitive_to_text_decoding_path() {
        let dir = tempfile::tempdir().unwrap();
        // CRLF preserved verbatim: the hash must be over raw bytes so the
        // drift detector's own byte-exact hash agrees with this one.
        fs::write(dir.path().join("a.py"), b"import os\r\n").unwrap();
        let scan = build_snapshot(dir.path(), 1_000_000, None).unwrap();
        let expected = format!("{:x}", Sha256::digest(b"import os\r\n"));
        assert_eq!(scan.snapshot.files[0].content_hash, expected);
    }

    #[test]
    fn total_files_counts_excluded_and_oversized_too() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), b"import os\n").unwrap();
        fs::write(dir.path().join("notes.md"), b"# hi\n").unwrap();
        let scan = build_snapshot(dir.path(), 1_000_000, None).unwrap();
        assert_eq!(scan.total_files, 2);
        assert_eq!(scan.snapshot.files.len(), 1);
    }
}
