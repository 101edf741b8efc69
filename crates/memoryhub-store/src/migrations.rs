//! Ordered, idempotent schema migrations.
//!
//! Each migration runs inside its own transaction and is recorded in
//! `schema_migrations` by version number. A migration never assumes it is
//! running against a fresh database: `CREATE TABLE IF NOT EXISTS` and
//! existence checks before `ALTER TABLE` mean re-running an already-applied
//! migration is a no-op, and the destructive audit-table rename (migration
//! 6) detects and heals a half-applied state on its own.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// One entry per schema version, applied in order starting from 0.
const MIGRATIONS: &[(i64, fn(&Connection) -> Result<()>)] = &[
    (0, migrate_0_project_meta),
    (1, migrate_1_role_state),
    (2, migrate_2_open_loops),
    (3, migrate_3_handoff_packets),
    (4, migrate_4_catalog_tables),
    (5, migrate_5_consistency_and_drift),
    (6, migrate_6_sync_audit),
];

pub fn run_pending(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .context("creating schema_migrations table")?;

    for (version, migrate) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
                [version],
                |row| row.get(0),
            )
            .context("checking schema_migrations")?;
        if already_applied {
            continue;
        }

        let tx = conn.transaction().context("opening migration transaction")?;
        migrate(&tx).with_context(|| format!("applying migration {version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, crate::now_rfc3339()],
        )
        .context("recording migration version")?;
        tx.commit().context("committing migration")?;
        tracing::info!(version, "applied schema migration");
    }
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |row| row.get(0),
    )?)
}

fn migrate_0_project_meta(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS project_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            memory_version INTEGER NOT NULL DEFAULT 0,
            workspace_root TEXT,
            updated_at TEXT NOT NULL
        )",
    )?;
    Ok(())
}

fn migrate_1_role_state(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS role_state_current (
            role TEXT NOT NULL,
            memory_key TEXT NOT NULL,
            value TEXT NOT NULL,
            confidence REAL NOT NULL,
            source_refs TEXT NOT NULL DEFAULT '[]',
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by_client TEXT NOT NULL,
            PRIMARY KEY (role, memory_key)
         );
         CREATE TABLE IF NOT EXISTS role_state_versions (
            version_id TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            memory_key TEXT NOT NULL,
            value TEXT NOT NULL,
            confidence REAL NOT NULL,
            source_refs TEXT NOT NULL DEFAULT '[]',
            supersedes_version_id TEXT,
            memory_version INTEGER NOT NULL,
            created_by_client TEXT NOT NULL,
            created_at TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_role_state_versions_key
            ON role_state_versions(role, memory_key, memory_version);",
    )?;
    Ok(())
}

fn migrate_2_open_loops(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS open_loops (
            loop_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            details TEXT,
            priority INTEGER NOT NULL DEFAULT 3,
            owner_role TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            created_at TEXT NOT NULL,
            created_by_client TEXT NOT NULL,
            closed_at TEXT,
            closed_by_client TEXT,
            memory_version INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_open_loops_status_priority
            ON open_loops(status, priority, created_at);",
    )?;
    Ok(())
}

fn migrate_3_handoff_packets(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS handoff_packets (
            handoff_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            summary TEXT NOT NULL,
            ttl_expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            created_by_client TEXT NOT NULL,
            memory_version INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_handoff_packets_created_at
            ON handoff_packets(created_at DESC);",
    )?;
    Ok(())
}

fn migrate_4_catalog_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS catalog_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            catalog_version TEXT,
            total_files INTEGER NOT NULL DEFAULT 0,
            indexed_files INTEGER NOT NULL DEFAULT 0,
            last_indexed_at TEXT,
            last_full_rebuild INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS catalog_files (
            file_path TEXT PRIMARY KEY,
            file_hash TEXT NOT NULL,
            language TEXT NOT NULL,
            import_count INTEGER NOT NULL DEFAULT 0,
            size_bytes INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS catalog_edges (
            from_file TEXT NOT NULL,
            to_module TEXT NOT NULL,
            edge_type TEXT NOT NULL DEFAULT 'import',
            confidence REAL NOT NULL,
            source_type TEXT NOT NULL,
            PRIMARY KEY (from_file, to_module)
         );
         CREATE TABLE IF NOT EXISTS catalog_jobs (
            job_id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 5,
            last_error TEXT,
            next_retry_at TEXT,
            lease_expires_at TEXT,
            created_at TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_catalog_jobs_status
            ON catalog_jobs(status, next_retry_at, created_at);",
    )?;
    Ok(())
}

fn migrate_5_consistency_and_drift(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS consistency_links (
            sync_id TEXT NOT NULL,
            memory_version INTEGER NOT NULL,
            catalog_version TEXT NOT NULL,
            consistency_status TEXT NOT NULL,
            created_at TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_consistency_links_created_at
            ON consistency_links(created_at DESC);
         CREATE TABLE IF NOT EXISTS drift_reports (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            method TEXT NOT NULL,
            drift_score REAL NOT NULL,
            changed_files TEXT NOT NULL DEFAULT '[]',
            total_files INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
         );",
    )?;
    Ok(())
}

/// Creates `sync_audit`, healing the half-applied rename state described in
/// the store's destructive-migration contract: if the intermediate table
/// (`audit_log_new`) exists but the legacy table (`audit_log`) does not, the
/// rename into place never finished and is completed here before recording
/// this migration as applied.
fn migrate_6_sync_audit(conn: &Connection) -> Result<()> {
    if table_exists(conn, "sync_audit")? {
        return Ok(());
    }

    let new_exists = table_exists(conn, "audit_log_new")?;
    let old_exists = table_exists(conn, "audit_log")?;

    if new_exists {
        conn.execute_batch("ALTER TABLE audit_log_new RENAME TO sync_audit;")?;
        tracing::warn!("healed half-applied audit table rename");
        return Ok(());
    }

    if old_exists {
        conn.execute_batch(
            "CREATE TABLE audit_log_new (
                sync_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                client_id TEXT NOT NULL DEFAULT '',
                session_id TEXT NOT NULL DEFAULT '',
                request_json TEXT NOT NULL DEFAULT '{}',
                response_json TEXT NOT NULL DEFAULT '{}',
                error_code TEXT,
                latency_ms INTEGER,
                created_at TEXT NOT NULL
             );",
        )?;
        conn.execute_batch(
            "INSERT INTO audit_log_new (sync_id, direction, created_at)
             SELECT sync_id, direction, created_at FROM audit_log;
             DROP TABLE audit_log;
             ALTER TABLE audit_log_new RENAME TO sync_audit;",
        )?;
        return Ok(());
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_audit (
            sync_id TEXT NOT NULL,
            direction TEXT NOT NULL,
            client_id TEXT NOT NULL DEFAULT '',
            session_id TEXT NOT NULL DEFAULT '',
            request_json TEXT NOT NULL DEFAULT '{}',
            response_json TEXT NOT NULL DEFAULT '{}',
            error_code TEXT,
            latency_ms INTEGER,
            created_at TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_sync_audit_created_at
            ON sync_audit(created_at DESC);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_applies_all_migrations_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_pending(&mut conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn reopening_applies_zero_additional_migrations() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_pending(&mut conn).unwrap();
        run_pending(&mut conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn half_applied_audit_rename_heals_on_open() {
        let mut conn = Connection::open_in_memory().unwrap();
        // Simulate migrations 0..=5 already applied, then a crash between
        // dropping audit_log_new's predecessor and the final rename.
        conn.execute_batch(
            "CREATE TABLE schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);
             INSERT INTO schema_migrations (version, applied_at)
                VALUES (0, 'x'), (1, 'x'), (2, 'x'), (3, 'x'), (4, 'x'), (5, 'x');
             CREATE TABLE audit_log_new (
                sync_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                client_id TEXT NOT NULL DEFAULT '',
                session_id TEXT NOT NULL DEFAULT '',
                request_json TEXT NOT NULL DEFAULT '{}',
                response_json TEXT NOT NULL DEFAULT '{}',
                error_code TEXT,
                latency_ms INTEGER,
                created_at TEXT NOT NULL
             );",
        )
        .unwrap();

        run_pending(&mut conn).unwrap();

        assert!(table_exists(&conn, "sync_audit").unwrap());
        assert!(!table_exists(&conn, "audit_log_new").unwrap());
        conn.execute(
            "INSERT INTO sync_audit (sync_id, direction, created_at) VALUES ('s1', 'catalog_brief', 'now')",
            [],
        )
        .unwrap();
    }
}
