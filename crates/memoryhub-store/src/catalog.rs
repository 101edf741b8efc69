//! `catalog_meta` / `catalog_files` / `catalog_edges` / `drift_reports`.

use anyhow::Result;
use rusqlite::{params, OptionalExtension, Transaction};

use memoryhub_types::{CatalogEdge, CatalogFile, CatalogSnapshot, DriftMethod};

use crate::now_rfc3339;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogFileRow {
    pub path: String,
    pub language: String,
    pub import_count: i64,
}

/// Replaces the catalog tables wholesale (`DELETE` then `INSERT`) and
/// upserts `catalog_meta`. Runs inside the worker's rebuild transaction,
/// never the push transaction.
pub fn replace_catalog_snapshot(
    tx: &Transaction<'_>,
    snapshot: &CatalogSnapshot,
    total_files: i64,
    full_rebuild: bool,
) -> Result<()> {
    tx.execute("DELETE FROM catalog_files", [])?;
    tx.execute("DELETE FROM catalog_edges", [])?;

    for file in &snapshot.files {
        tx.execute(
            "INSERT INTO catalog_files (file_path, file_hash, language, import_count, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                file.path,
                file.content_hash,
                file.language,
                import_count_for(snapshot, &file.path),
                file.size_bytes,
            ],
        )?;
    }

    for edge in &snapshot.edges {
        tx.execute(
            "INSERT OR IGNORE INTO catalog_edges (from_file, to_module, edge_type, confidence, source_type)
             VALUES (?1, ?2, 'import', ?3, ?4)",
            params![
                edge.from_path,
                edge.to_module,
                edge.confidence,
                edge.source_type.as_str(),
            ],
        )?;
    }

    let indexed_files = snapshot.files.len() as i64;
    tx.execute(
        "INSERT INTO catalog_meta (id, catalog_version, total_files, indexed_files, last_indexed_at, last_full_rebuild)
         VALUES (1, ?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            catalog_version = excluded.catalog_version,
            total_files = excluded.total_files,
            indexed_files = excluded.indexed_files,
            last_indexed_at = excluded.last_indexed_at,
            last_full_rebuild = excluded.last_full_rebuild",
        params![
            snapshot.catalog_version,
            total_files,
            indexed_files,
            now_rfc3339(),
            full_rebuild as i64,
        ],
    )?;
    Ok(())
}

fn import_count_for(snapshot: &CatalogSnapshot, path: &str) -> i64 {
    snapshot
        .edges
        .iter()
        .filter(|e| e.from_path == path)
        .count() as i64
}

#[derive(Debug, Clone)]
pub struct CatalogHealthRow {
    pub catalog_version: Option<String>,
    pub total_files: i64,
    pub indexed_files: i64,
    pub last_indexed_at: Option<String>,
    pub last_full_rebuild: bool,
    pub pending_jobs: i64,
    pub running_jobs: i64,
    pub failed_jobs: i64,
}

pub fn catalog_health_row(conn: &rusqlite::Connection) -> Result<CatalogHealthRow> {
    let meta = conn
        .query_row(
            "SELECT catalog_version, total_files, indexed_files, last_indexed_at, last_full_rebuild
             FROM catalog_meta WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)? != 0,
                ))
            },
        )
        .optional()?;

    let (catalog_version, total_files, indexed_files, last_indexed_at, last_full_rebuild) =
        meta.unwrap_or((None, 0, 0, None, false));

    let pending_jobs: i64 = conn.query_row(
        "SELECT COUNT(*) FROM catalog_jobs WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )?;
    let running_jobs: i64 = conn.query_row(
        "SELECT COUNT(*) FROM catalog_jobs WHERE status = 'running'",
        [],
        |row| row.get(0),
    )?;
    let failed_jobs: i64 = conn.query_row(
        "SELECT COUNT(*) FROM catalog_jobs WHERE status = 'failed'",
        [],
        |row| row.get(0),
    )?;

    Ok(CatalogHealthRow {
        catalog_version,
        total_files,
        indexed_files,
        last_indexed_at,
        last_full_rebuild,
        pending_jobs,
        running_jobs,
        failed_jobs,
    })
}

/// All currently-indexed files, for drift comparisons.
pub fn all_catalog_files(conn: &rusqlite::Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT file_path, file_hash FROM catalog_files")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Scoring-relevant rows for the catalog brief: files plus their edges.
pub fn catalog_files_and_edges(
    conn: &rusqlite::Connection,
) -> Result<(Vec<CatalogFile>, Vec<CatalogEdge>)> {
    let mut file_stmt =
        conn.prepare("SELECT file_path, language, file_hash, size_bytes FROM catalog_files")?;
    let files = file_stmt
        .query_map([], |row| {
            Ok(CatalogFile {
                path: row.get(0)?,
                language: row.get(1)?,
                content_hash: row.get(2)?,
                size_bytes: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut edge_stmt = conn
        .prepare("SELECT from_file, to_module, confidence, source_type FROM catalog_edges")?;
    let edges = edge_stmt
        .query_map([], |row| {
            let source_type: String = row.get(3)?;
            Ok(CatalogEdge {
                from_path: row.get(0)?,
                to_module: row.get(1)?,
                confidence: row.get(2)?,
                source_type: if source_type == "ast" {
                    memoryhub_types::ImportSourceType::Ast
                } else {
                    memoryhub_types::ImportSourceType::Inferred
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok((files, edges))
}

#[derive(Debug, Clone)]
pub struct DriftReportRow {
    pub method: DriftMethod,
    pub drift_score: f64,
    pub changed_files: Vec<String>,
    pub total_files: i64,
}

pub fn insert_drift_report(
    conn: &rusqlite::Connection,
    method: DriftMethod,
    drift_score: f64,
    changed_files: &[String],
    total_files: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO drift_reports (id, method, drift_score, changed_files, total_files, created_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            method = excluded.method,
            drift_score = excluded.drift_score,
            changed_files = excluded.changed_files,
            total_files = excluded.total_files,
            created_at = excluded.created_at",
        params![
            method.as_str(),
            drift_score,
            serde_json::to_string(changed_files)?,
            total_files,
            now_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn latest_drift_report(conn: &rusqlite::Connection) -> Result<Option<DriftReportRow>> {
    let row = conn
        .query_row(
            "SELECT method, drift_score, changed_files, total_files FROM drift_reports WHERE id = 1",
            [],
            |row| {
                let method_raw: String = row.get(0)?;
                let changed_raw: String = row.get(2)?;
                Ok(DriftReportRow {
                    method: if method_raw == "git_diff" {
                        DriftMethod::GitDiff
                    } else {
                        DriftMethod::HashCompare
                    },
                    drift_score: row.get(1)?,
                    changed_files: serde_json::from_str(&changed_raw).unwrap_or_default(),
                    total_files: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
