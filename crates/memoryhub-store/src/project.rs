//! `project_meta`: the per-project singleton row.

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::now_rfc3339;

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectMetaRow {
    pub memory_version: i64,
    pub workspace_root: Option<String>,
    pub updated_at: String,
}

pub(crate) fn ensure_project_meta_row(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO project_meta (id, memory_version, workspace_root, updated_at)
         VALUES (1, 0, NULL, ?1)",
        params![now_rfc3339()],
    )?;
    Ok(())
}

pub fn project_meta(conn: &Connection) -> Result<ProjectMetaRow> {
    let row = conn.query_row(
        "SELECT memory_version, workspace_root, updated_at FROM project_meta WHERE id = 1",
        [],
        |row| {
            Ok(ProjectMetaRow {
                memory_version: row.get(0)?,
                workspace_root: row.get(1)?,
                updated_at: row.get(2)?,
            })
        },
    )?;
    Ok(row)
}

/// Binds `workspace_root` on first use. No-op if already bound to the same
/// value; callers must check `enforce_workspace_binding` first to reject a
/// mismatch — this function does not itself re-validate.
pub fn bind_workspace_root(conn: &Connection, workspace_root: &str) -> Result<()> {
    conn.execute(
        "UPDATE project_meta SET workspace_root = ?1, updated_at = ?2
         WHERE id = 1 AND workspace_root IS NULL",
        params![workspace_root, now_rfc3339()],
    )?;
    Ok(())
}

/// Bumps `memory_version` to `new_version` inside the caller's write
/// transaction. Must only be called once per successful push.
pub fn bump_memory_version(tx: &rusqlite::Transaction<'_>, new_version: i64) -> Result<()> {
    tx.execute(
        "UPDATE project_meta SET memory_version = ?1, updated_at = ?2 WHERE id = 1",
        params![new_version, now_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[test]
    fn bind_is_sticky_on_first_call() {
        let store = Store::connect_in_memory_for_tests("p").unwrap();
        bind_workspace_root(store.conn(), "/a").unwrap();
        bind_workspace_root(store.conn(), "/b").unwrap();
        assert_eq!(
            project_meta(store.conn()).unwrap().workspace_root,
            Some("/a".to_string())
        );
    }
}
