//! Per-project transactional store for memory-hub.
//!
//! One SQLite database file per `project_id`, opened with WAL journaling and
//! a bounded busy timeout. All multi-row writes go through an explicit
//! `rusqlite::Transaction` the caller opens and commits; nothing in this
//! crate commits implicitly.

mod audit;
mod catalog;
mod consistency;
mod jobs;
mod migrations;
mod open_loops;
mod project;
mod role_state;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::Connection;

use memoryhub_types::{validate_project_id, BusinessError, ErrorCode};

pub use audit::{insert_sync_audit, list_sync_audit, new_sync_id, SyncAuditRow};
pub use catalog::{
    all_catalog_files, catalog_files_and_edges, catalog_health_row, insert_drift_report,
    latest_drift_report, replace_catalog_snapshot, CatalogFileRow, CatalogHealthRow,
    DriftReportRow,
};
pub use consistency::{insert_consistency_link, latest_consistency_link, ConsistencyLinkRow};
pub use jobs::{
    claim_next_catalog_job, enqueue_catalog_job, mark_catalog_job_done, mark_catalog_job_failed,
    CatalogJobRow,
};
pub use open_loops::{close_open_loops, insert_open_loops, top_open_loops, NewOpenLoop, OpenLoopRow};
pub use project::{bind_workspace_root, bump_memory_version, project_meta, ProjectMetaRow};
pub use role_state::{
    current_role_value, find_conflicts, insert_handoff_packet, latest_handoff_packet,
    recent_role_payloads, upsert_role_delta, AppliedRoleDelta, HandoffPacketRow, RoleDeltaWrite,
    RolePayloadRow, VersionConflict,
};

/// Returns the current instant formatted as RFC3339, the timestamp format
/// used throughout this crate's tables.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// A connected, migrated handle to one project's store.
pub struct Store {
    conn: Connection,
    project_id: String,
}

impl Store {
    /// Opens (creating if absent) `<root>/projects/<project_id>/memory.db`,
    /// applies pending migrations, and guarantees the `ProjectMeta` row
    /// exists with `memory_version = 0`.
    pub fn connect(root: &Path, project_id: &str, busy_timeout_ms: u32) -> Result<Store> {
        validate_project_id(project_id).map_err(|e: BusinessError| anyhow::anyhow!(e))?;

        let project_dir = root.join("projects").join(project_id);
        std::fs::create_dir_all(&project_dir)
            .with_context(|| format!("creating project directory {}", project_dir.display()))?;
        let db_path = project_dir.join("memory.db");

        let mut conn = Connection::open(&db_path)
            .with_context(|| format!("opening {}", db_path.display()))?;
        conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms as u64))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_pending(&mut conn)?;
        project::ensure_project_meta_row(&conn)?;

        Ok(Store {
            conn,
            project_id: project_id.to_string(),
        })
    }

    /// In-memory store for tests; still runs migrations.
    #[doc(hidden)]
    pub fn connect_in_memory_for_tests(project_id: &str) -> Result<Store> {
        validate_project_id(project_id).map_err(|e: BusinessError| anyhow::anyhow!(e))?;
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_pending(&mut conn)?;
        project::ensure_project_meta_row(&conn)?;
        Ok(Store {
            conn,
            project_id: project_id.to_string(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Opens an explicit `BEGIN IMMEDIATE` write transaction. All
    /// transactional write APIs in this crate assume the caller holds one
    /// of these; none of them commits on the caller's behalf.
    pub fn begin_immediate(&mut self) -> Result<rusqlite::Transaction<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        Ok(tx)
    }
}

/// Resolves `<root>/projects/<project_id>/memory.db` without opening it —
/// used by callers that only need to check existence (e.g. "first use per
/// project").
pub fn db_path(root: &Path, project_id: &str) -> PathBuf {
    root.join("projects").join(project_id).join("memory.db")
}

/// Enforces workspace binding: the first successful push/catalog build for a
/// project binds `workspace_root`; every later write must match exactly, or
/// this returns `WORKSPACE_MISMATCH`. Passing `None` means the caller has no
/// opinion on the workspace and the check is skipped.
pub fn enforce_workspace_binding(
    conn: &Connection,
    asserted: Option<&str>,
) -> Result<(), BusinessError> {
    let Some(asserted) = asserted else {
        return Ok(());
    };
    let bound: Option<String> = conn
        .query_row(
            "SELECT workspace_root FROM project_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(None);
    match bound {
        Some(existing) if existing != asserted => Err(BusinessError::new(
            ErrorCode::WorkspaceMismatch,
            format!("project is bound to workspace '{existing}', got '{asserted}'"),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn require_positive_rows(affected: usize, what: &str) -> Result<()> {
    if affected == 0 {
        bail!("expected at least one row affected by {what}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_creates_project_meta_with_zero_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::connect(dir.path(), "p1", 2000).unwrap();
        let meta = project_meta(store.conn()).unwrap();
        assert_eq!(meta.memory_version, 0);
        assert!(meta.workspace_root.is_none());
    }

    #[test]
    fn connect_rejects_invalid_project_id() {
        let dir = tempfile::tempdir().unwrap();
        let err = Store::connect(dir.path(), "../escape", 2000).unwrap_err();
        assert!(err.to_string().contains("project_id"));
    }

    #[test]
    fn reconnecting_does_not_reset_memory_version() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = Store::connect(dir.path(), "p1", 2000).unwrap();
            let tx = store.begin_immediate().unwrap();
            tx.execute(
                "UPDATE project_meta SET memory_version = 5, updated_at = ?1 WHERE id = 1",
                [now_rfc3339()],
            )
            .unwrap();
            tx.commit().unwrap();
        }
        let store = Store::connect(dir.path(), "p1", 2000).unwrap();
        assert_eq!(project_meta(store.conn()).unwrap().memory_version, 5);
    }

    #[test]
    fn workspace_binding_allows_first_write_and_rejects_mismatch() {
        let store = Store::connect_in_memory_for_tests("p1").unwrap();
        assert!(enforce_workspace_binding(store.conn(), Some("/ws_a")).is_ok());
        bind_workspace_root(store.conn(), "/ws_a").unwrap();
        assert!(enforce_workspace_binding(store.conn(), Some("/ws_a")).is_ok());
        let err = enforce_workspace_binding(store.conn(), Some("/ws_b")).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::WorkspaceMismatch);
    }
}
