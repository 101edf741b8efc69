//! `consistency_links`: the join between a `memory_version` and the catalog
//! version it was committed with, and whether the two agree.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use memoryhub_types::ConsistencyStatus;

use crate::now_rfc3339;

pub fn insert_consistency_link(
    conn: &rusqlite::Connection,
    sync_id: &str,
    memory_version: i64,
    catalog_version: &str,
    status: ConsistencyStatus,
) -> Result<()> {
    conn.execute(
        "INSERT INTO consistency_links (sync_id, memory_version, catalog_version, consistency_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            sync_id,
            memory_version,
            catalog_version,
            status.as_str(),
            now_rfc3339(),
        ],
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ConsistencyLinkRow {
    pub memory_version: i64,
    pub catalog_version: String,
    pub consistency_status: ConsistencyStatus,
}

/// The most recently inserted link, used to surface `catalog_health`'s
/// `consistency_status` ("unknown" when none has ever been written).
pub fn latest_consistency_link(conn: &rusqlite::Connection) -> Result<Option<ConsistencyLinkRow>> {
    let row = conn
        .query_row(
            "SELECT memory_version, catalog_version, consistency_status
             FROM consistency_links ORDER BY created_at DESC LIMIT 1",
            [],
            |row| {
                let status_raw: String = row.get(2)?;
                Ok(ConsistencyLinkRow {
                    memory_version: row.get(0)?,
                    catalog_version: row.get(1)?,
                    consistency_status: parse_status(&status_raw),
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn parse_status(raw: &str) -> ConsistencyStatus {
    match raw {
        "ok" => ConsistencyStatus::Ok,
        "degraded" => ConsistencyStatus::Degraded,
        _ => ConsistencyStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[test]
    fn latest_link_reflects_most_recent_insert() {
        let store = Store::connect_in_memory_for_tests("p").unwrap();
        insert_consistency_link(store.conn(), "sync_1", 1, "sha256:a", ConsistencyStatus::Degraded)
            .unwrap();
        insert_consistency_link(store.conn(), "sync_2", 1, "sha256:a", ConsistencyStatus::Ok)
            .unwrap();
        let latest = latest_consistency_link(store.conn()).unwrap().unwrap();
        assert_eq!(latest.consistency_status, ConsistencyStatus::Ok);
    }

    #[test]
    fn absent_link_is_none() {
        let store = Store::connect_in_memory_for_tests("p").unwrap();
        assert!(latest_consistency_link(store.conn()).unwrap().is_none());
    }
}
