//! `role_state_current` / `role_state_versions` / `handoff_packets`.

use anyhow::Result;
use rusqlite::{params, OptionalExtension, Transaction};
use serde_json::Value;
use uuid::Uuid;

use crate::now_rfc3339;

/// One role-delta write requested by a push.
#[derive(Debug, Clone)]
pub struct RoleDeltaWrite {
    pub role: String,
    pub memory_key: String,
    pub value: Value,
    pub confidence: f64,
    pub source_refs: Value,
    pub created_by_client: String,
}

/// A conflict found against a delta's `(role, memory_key)` when the
/// caller's `context_stamp.base < current_version`.
#[derive(Debug, Clone)]
pub struct VersionConflict {
    pub role: String,
    pub memory_key: String,
    pub current_version: i64,
    pub theirs: Value,
    pub updated_at: String,
    pub updated_by_client: String,
    pub version_id: String,
}

/// For each unique `(role, memory_key)` pair among `deltas`, looks up the
/// newest `role_state_versions` row with `memory_version > base`. Returns one
/// `VersionConflict` per key that has such a row.
pub fn find_conflicts(
    tx: &Transaction<'_>,
    deltas: &[RoleDeltaWrite],
    base: i64,
) -> Result<Vec<VersionConflict>> {
    let mut seen = std::collections::BTreeSet::new();
    let mut conflicts = Vec::new();
    for delta in deltas {
        let key = (delta.role.clone(), delta.memory_key.clone());
        if !seen.insert(key.clone()) {
            continue;
        }
        let found = tx
            .query_row(
                "SELECT version_id, value, memory_version, created_at, created_by_client
                 FROM role_state_versions
                 WHERE role = ?1 AND memory_key = ?2 AND memory_version > ?3
                 ORDER BY memory_version DESC LIMIT 1",
                params![key.0, key.1, base],
                |row| {
                    let value_raw: String = row.get(1)?;
                    Ok(VersionConflict {
                        role: key.0.clone(),
                        memory_key: key.1.clone(),
                        version_id: row.get(0)?,
                        theirs: serde_json::from_str(&value_raw).unwrap_or(Value::Null),
                        current_version: row.get(2)?,
                        updated_at: row.get(3)?,
                        updated_by_client: row.get(4)?,
                    })
                },
            )
            .optional()?;
        if let Some(conflict) = found {
            conflicts.push(conflict);
        }
    }
    Ok(conflicts)
}

/// Result of writing one role delta.
pub struct AppliedRoleDelta {
    pub version_id: String,
    pub role: String,
    pub memory_key: String,
}

/// Writes one role delta: a new `role_state_versions` row superseding the
/// prior latest for `(role, memory_key)`, plus an upsert into
/// `role_state_current`. Must run inside the push's write transaction.
pub fn upsert_role_delta(
    tx: &Transaction<'_>,
    delta: &RoleDeltaWrite,
    memory_version: i64,
) -> Result<AppliedRoleDelta> {
    let previous_version_id: Option<String> = tx
        .query_row(
            "SELECT version_id FROM role_state_versions
             WHERE role = ?1 AND memory_key = ?2
             ORDER BY memory_version DESC LIMIT 1",
            params![delta.role, delta.memory_key],
            |row| row.get(0),
        )
        .optional()?;

    let version_id = format!("ver_{}", Uuid::new_v4().simple());
    let now = now_rfc3339();
    let value_json = serde_json::to_string(&delta.value)?;
    let source_refs_json = serde_json::to_string(&delta.source_refs)?;

    tx.execute(
        "INSERT INTO role_state_versions
            (version_id, role, memory_key, value, confidence, source_refs,
             supersedes_version_id, memory_version, created_by_client, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            version_id,
            delta.role,
            delta.memory_key,
            value_json,
            delta.confidence,
            source_refs_json,
            previous_version_id,
            memory_version,
            delta.created_by_client,
            now,
        ],
    )?;

    tx.execute(
        "INSERT INTO role_state_current
            (role, memory_key, value, confidence, source_refs, version, updated_at, updated_by_client)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(role, memory_key) DO UPDATE SET
            value = excluded.value,
            confidence = excluded.confidence,
            source_refs = excluded.source_refs,
            version = excluded.version,
            updated_at = excluded.updated_at,
            updated_by_client = excluded.updated_by_client",
        params![
            delta.role,
            delta.memory_key,
            value_json,
            delta.confidence,
            source_refs_json,
            memory_version,
            now,
            delta.created_by_client,
        ],
    )?;

    Ok(AppliedRoleDelta {
        version_id,
        role: delta.role.clone(),
        memory_key: delta.memory_key.clone(),
    })
}

/// One entry in a `pull` response's `role_payloads[role]`.
#[derive(Debug, Clone)]
pub struct RolePayloadRow {
    pub memory_key: String,
    pub value: Value,
    pub confidence: f64,
    pub version: i64,
    pub updated_at: String,
    pub updated_by_client: String,
    pub source_refs: Value,
}

/// Up to 8 most-recently-updated `(memory_key, value, ...)` entries for one
/// role, newest first.
pub fn recent_role_payloads(
    conn: &rusqlite::Connection,
    role: &str,
    limit: i64,
) -> Result<Vec<RolePayloadRow>> {
    let mut stmt = conn.prepare(
        "SELECT memory_key, value, confidence, version, updated_at, updated_by_client, source_refs
         FROM role_state_current
         WHERE role = ?1
         ORDER BY updated_at DESC, memory_key ASC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![role, limit], |row| {
            let value_raw: String = row.get(1)?;
            let source_refs_raw: String = row.get(6)?;
            Ok(RolePayloadRow {
                memory_key: row.get(0)?,
                value: serde_json::from_str(&value_raw).unwrap_or(Value::Null),
                confidence: row.get(2)?,
                version: row.get(3)?,
                updated_at: row.get(4)?,
                updated_by_client: row.get(5)?,
                source_refs: serde_json::from_str(&source_refs_raw).unwrap_or(Value::Array(vec![])),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Reads the current value for `(role, memory_key)`, if any — used by
/// `resolve_conflict`'s `merge_note` strategy.
pub fn current_role_value(
    conn: &rusqlite::Connection,
    role: &str,
    memory_key: &str,
) -> Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM role_state_current WHERE role = ?1 AND memory_key = ?2",
            params![role, memory_key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.map(|s| serde_json::from_str(&s).unwrap_or(Value::Null)))
}

#[derive(Debug, Clone)]
pub struct HandoffPacketRow {
    pub handoff_id: String,
    pub session_id: String,
    pub summary: Value,
    pub ttl_expires_at: String,
    pub created_at: String,
    pub created_by_client: String,
    pub memory_version: i64,
}

pub fn insert_handoff_packet(
    tx: &Transaction<'_>,
    session_id: &str,
    summary: &Value,
    ttl: chrono::Duration,
    created_by_client: &str,
    memory_version: i64,
) -> Result<HandoffPacketRow> {
    let handoff_id = format!("handoff_{}", Uuid::new_v4().simple());
    let now = chrono::Utc::now();
    let ttl_expires_at = (now + ttl).to_rfc3339();
    let created_at = now.to_rfc3339();
    let summary_json = serde_json::to_string(summary)?;

    tx.execute(
        "INSERT INTO handoff_packets
            (handoff_id, session_id, summary, ttl_expires_at, created_at, created_by_client, memory_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            handoff_id,
            session_id,
            summary_json,
            ttl_expires_at,
            created_at,
            created_by_client,
            memory_version,
        ],
    )?;

    Ok(HandoffPacketRow {
        handoff_id,
        session_id: session_id.to_string(),
        summary: summary.clone(),
        ttl_expires_at,
        created_at,
        created_by_client: created_by_client.to_string(),
        memory_version,
    })
}

/// The latest non-expired handoff packet, if any.
pub fn latest_handoff_packet(conn: &rusqlite::Connection) -> Result<Option<HandoffPacketRow>> {
    let now = now_rfc3339();
    let row = conn
        .query_row(
            "SELECT handoff_id, session_id, summary, ttl_expires_at, created_at, created_by_client, memory_version
             FROM handoff_packets
             WHERE ttl_expires_at > ?1
             ORDER BY created_at DESC LIMIT 1",
            params![now],
            |row| {
                let summary_raw: String = row.get(2)?;
                Ok(HandoffPacketRow {
                    handoff_id: row.get(0)?,
                    session_id: row.get(1)?,
                    summary: serde_json::from_str(&summary_raw).unwrap_or(Value::Null),
                    ttl_expires_at: row.get(3)?,
                    created_at: row.get(4)?,
                    created_by_client: row.get(5)?,
                    memory_version: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use serde_json::json;

    fn delta(role: &str, key: &str, value: Value) -> RoleDeltaWrite {
        RoleDeltaWrite {
            role: role.to_string(),
            memory_key: key.to_string(),
            value,
            confidence: 0.9,
            source_refs: json!([]),
            created_by_client: "c1".to_string(),
        }
    }

    #[test]
    fn upsert_then_current_reflects_latest_write() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        upsert_role_delta(&tx, &delta("pm", "goal", json!("first")), 1).unwrap();
        upsert_role_delta(&tx, &delta("pm", "goal", json!("second")), 2).unwrap();
        tx.commit().unwrap();

        let payloads = recent_role_payloads(store.conn(), "pm", 8).unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].value, json!("second"));
        assert_eq!(payloads[0].version, 2);
    }

    #[test]
    fn version_history_is_append_only_and_superseding() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        let first = upsert_role_delta(&tx, &delta("architect", "k", json!("a")), 1).unwrap();
        let second = upsert_role_delta(&tx, &delta("architect", "k", json!("b")), 2).unwrap();
        tx.commit().unwrap();

        let supersedes: Option<String> = store
            .conn()
            .query_row(
                "SELECT supersedes_version_id FROM role_state_versions WHERE version_id = ?1",
                params![second.version_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(supersedes, Some(first.version_id));
    }

    #[test]
    fn find_conflicts_detects_writes_past_base() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        upsert_role_delta(&tx, &delta("architect", "k", json!("a")), 1).unwrap();
        upsert_role_delta(&tx, &delta("architect", "k", json!("b")), 2).unwrap();
        let conflicts =
            find_conflicts(&tx, &[delta("architect", "k", json!("c"))], 1).unwrap();
        tx.commit().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].current_version, 2);
        assert_eq!(conflicts[0].theirs, json!("b"));
    }

    #[test]
    fn find_conflicts_is_empty_when_base_is_current() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        upsert_role_delta(&tx, &delta("architect", "k", json!("a")), 1).unwrap();
        let conflicts =
            find_conflicts(&tx, &[delta("architect", "k", json!("b"))], 1).unwrap();
        tx.commit().unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn handoff_packet_latest_respects_ttl() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        insert_handoff_packet(
            &tx,
            "s1",
            &json!({"summary": "seed"}),
            chrono::Duration::seconds(-1),
            "c1",
            1,
        )
        .unwrap();
        tx.commit().unwrap();
        assert!(latest_handoff_packet(store.conn()).unwrap().is_none());

        let tx = store.begin_immediate().unwrap();
        insert_handoff_packet(
            &tx,
            "s2",
            &json!({"summary": "fresh"}),
            chrono::Duration::hours(72),
            "c1",
            2,
        )
        .unwrap();
        tx.commit().unwrap();
        let latest = latest_handoff_packet(store.conn()).unwrap().unwrap();
        assert_eq!(latest.session_id, "s2");
    }
}
