//! `open_loops`.

use anyhow::Result;
use rusqlite::{params, Transaction};
use uuid::Uuid;

use crate::now_rfc3339;

#[derive(Debug, Clone, PartialEq)]
pub struct OpenLoopRow {
    pub loop_id: String,
    pub title: String,
    pub details: Option<String>,
    pub priority: i64,
    pub owner_role: Option<String>,
    pub status: String,
    pub created_at: String,
    pub owner_client: String,
}

/// One new open-loop request. Items with a blank title are skipped by the
/// caller before this is invoked (the engine validates, not the store).
#[derive(Debug, Clone)]
pub struct NewOpenLoop {
    pub loop_id: Option<String>,
    pub title: String,
    pub details: Option<String>,
    pub priority: i64,
    pub owner_role: Option<String>,
}

pub fn insert_open_loops(
    tx: &Transaction<'_>,
    loops: &[NewOpenLoop],
    created_by_client: &str,
    memory_version: i64,
) -> Result<Vec<OpenLoopRow>> {
    let now = now_rfc3339();
    let mut inserted = Vec::with_capacity(loops.len());
    for item in loops {
        let loop_id = item
            .loop_id
            .clone()
            .unwrap_or_else(|| format!("loop_{}", Uuid::new_v4().simple()));
        tx.execute(
            "INSERT INTO open_loops
                (loop_id, title, details, priority, owner_role, status, created_at,
                 created_by_client, memory_version)
             VALUES (?1, ?2, ?3, ?4, ?5, 'open', ?6, ?7, ?8)",
            params![
                loop_id,
                item.title,
                item.details,
                item.priority,
                item.owner_role,
                now,
                created_by_client,
                memory_version,
            ],
        )?;
        inserted.push(OpenLoopRow {
            loop_id,
            title: item.title.clone(),
            details: item.details.clone(),
            priority: item.priority,
            owner_role: item.owner_role.clone(),
            status: "open".to_string(),
            created_at: now.clone(),
            owner_client: created_by_client.to_string(),
        });
    }
    Ok(inserted)
}

/// Closes open loops matched by id or by exact (case-sensitive) title. The
/// title form may close multiple matches. Closing an id or title that
/// matches nothing is a silent no-op — it contributes no entry to the
/// returned list, never an error.
pub fn close_open_loops(
    tx: &Transaction<'_>,
    loop_ids: &[String],
    titles: &[String],
    closed_by_client: &str,
) -> Result<Vec<String>> {
    let now = now_rfc3339();
    let mut closed = Vec::new();

    for loop_id in loop_ids {
        let affected = tx.execute(
            "UPDATE open_loops SET status = 'closed', closed_at = ?1, closed_by_client = ?2
             WHERE loop_id = ?3 AND status = 'open'",
            params![now, closed_by_client, loop_id],
        )?;
        if affected > 0 {
            closed.push(loop_id.clone());
        }
    }

    for title in titles {
        let mut stmt = tx.prepare(
            "SELECT loop_id FROM open_loops WHERE title = ?1 AND status = 'open'",
        )?;
        let matched: Vec<String> = stmt
            .query_map(params![title], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);
        for loop_id in matched {
            tx.execute(
                "UPDATE open_loops SET status = 'closed', closed_at = ?1, closed_by_client = ?2
                 WHERE loop_id = ?3",
                params![now, closed_by_client, loop_id],
            )?;
            closed.push(loop_id);
        }
    }

    Ok(closed)
}

/// Up to `limit` highest-priority open loops, ordered `(priority ASC,
/// created_at ASC)`.
pub fn top_open_loops(conn: &rusqlite::Connection, limit: i64) -> Result<Vec<OpenLoopRow>> {
    let mut stmt = conn.prepare(
        "SELECT loop_id, title, details, priority, owner_role, status, created_at, created_by_client
         FROM open_loops
         WHERE status = 'open'
         ORDER BY priority ASC, created_at ASC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok(OpenLoopRow {
                loop_id: row.get(0)?,
                title: row.get(1)?,
                details: row.get(2)?,
                priority: row.get(3)?,
                owner_role: row.get(4)?,
                status: row.get(5)?,
                created_at: row.get(6)?,
                owner_client: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn new_loop(title: &str, priority: i64) -> NewOpenLoop {
        NewOpenLoop {
            loop_id: None,
            title: title.to_string(),
            details: None,
            priority,
            owner_role: None,
        }
    }

    #[test]
    fn top_open_loops_orders_by_priority_then_created_at() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        insert_open_loops(&tx, &[new_loop("low", 5), new_loop("high", 1)], "c1", 1).unwrap();
        tx.commit().unwrap();

        let top = top_open_loops(store.conn(), 3).unwrap();
        assert_eq!(top[0].title, "high");
        assert_eq!(top[1].title, "low");
    }

    #[test]
    fn closing_nonexistent_id_is_a_silent_no_op() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        let closed = close_open_loops(&tx, &["loop_missing".to_string()], &[], "c1").unwrap();
        tx.commit().unwrap();
        assert!(closed.is_empty());
    }

    #[test]
    fn closing_by_title_closes_all_matches() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        insert_open_loops(
            &tx,
            &[new_loop("dup", 1), new_loop("dup", 2)],
            "c1",
            1,
        )
        .unwrap();
        let closed = close_open_loops(&tx, &[], &["dup".to_string()], "c1").unwrap();
        tx.commit().unwrap();
        assert_eq!(closed.len(), 2);
        assert!(top_open_loops(store.conn(), 10).unwrap().is_empty());
    }
}
