//! `sync_audit`: every tool invocation, success or failure.

use anyhow::Result;
use rusqlite::{params, Transaction};
use serde_json::Value;
use uuid::Uuid;

use crate::now_rfc3339;

#[derive(Debug, Clone)]
pub struct SyncAuditRow {
    pub sync_id: String,
    pub direction: String,
    pub client_id: String,
    pub session_id: String,
    pub request: Value,
    pub response: Value,
    pub error_code: Option<String>,
    pub latency_ms: Option<i64>,
    pub created_at: String,
}

#[allow(clippy::too_many_arguments)]
pub fn insert_sync_audit(
    tx: &Transaction<'_>,
    sync_id: &str,
    direction: &str,
    client_id: &str,
    session_id: &str,
    request: &Value,
    response: &Value,
    error_code: Option<&str>,
    latency_ms: Option<i64>,
) -> Result<()> {
    tx.execute(
        "INSERT INTO sync_audit
            (sync_id, direction, client_id, session_id, request_json, response_json,
             error_code, latency_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            sync_id,
            direction,
            client_id,
            session_id,
            serde_json::to_string(request)?,
            serde_json::to_string(response)?,
            error_code,
            latency_ms,
            now_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn new_sync_id() -> String {
    format!("sync_{}", Uuid::new_v4().simple())
}

pub fn list_sync_audit(
    conn: &rusqlite::Connection,
    direction: Option<&str>,
    limit: i64,
) -> Result<Vec<SyncAuditRow>> {
    let sql = if direction.is_some() {
        "SELECT sync_id, direction, client_id, session_id, request_json, response_json,
                error_code, latency_ms, created_at
         FROM sync_audit WHERE direction = ?1 ORDER BY created_at DESC LIMIT ?2"
    } else {
        "SELECT sync_id, direction, client_id, session_id, request_json, response_json,
                error_code, latency_ms, created_at
         FROM sync_audit ORDER BY created_at DESC LIMIT ?1"
    };
    let mut stmt = conn.prepare(sql)?;
    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<SyncAuditRow> {
        let request_raw: String = row.get(4)?;
        let response_raw: String = row.get(5)?;
        Ok(SyncAuditRow {
            sync_id: row.get(0)?,
            direction: row.get(1)?,
            client_id: row.get(2)?,
            session_id: row.get(3)?,
            request: serde_json::from_str(&request_raw).unwrap_or(Value::Null),
            response: serde_json::from_str(&response_raw).unwrap_or(Value::Null),
            error_code: row.get(6)?,
            latency_ms: row.get(7)?,
            created_at: row.get(8)?,
        })
    };
    let rows = if let Some(direction) = direction {
        stmt.query_map(params![direction, limit], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        stmt.query_map(params![limit], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use serde_json::json;

    #[test]
    fn list_filters_by_direction_and_is_newest_first() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        insert_sync_audit(
            &tx,
            "sync_1",
            "pull",
            "c1",
            "s1",
            &json!({}),
            &json!({}),
            None,
            Some(2),
        )
        .unwrap();
        insert_sync_audit(
            &tx,
            "sync_2",
            "push",
            "c1",
            "s1",
            &json!({}),
            &json!({}),
            None,
            Some(3),
        )
        .unwrap();
        tx.commit().unwrap();

        let all = list_sync_audit(store.conn(), None, 50).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].sync_id, "sync_2");

        let pulls = list_sync_audit(store.conn(), Some("pull"), 50).unwrap();
        assert_eq!(pulls.len(), 1);
        assert_eq!(pulls[0].sync_id, "sync_1");
    }
}
