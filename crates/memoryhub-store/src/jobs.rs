//! `catalog_jobs`: the lease-based, crash-recoverable refresh queue.

use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use serde_json::Value;
use uuid::Uuid;

use crate::now_rfc3339;

#[derive(Debug, Clone)]
pub struct CatalogJobRow {
    pub job_id: String,
    pub job_type: String,
    pub payload: Value,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
}

pub fn enqueue_catalog_job(
    tx: &Transaction<'_>,
    job_type: &str,
    payload: &Value,
    max_attempts: i64,
) -> Result<String> {
    let job_id = format!("job_{}", Uuid::new_v4().simple());
    tx.execute(
        "INSERT INTO catalog_jobs
            (job_id, job_type, payload, status, attempts, max_attempts, created_at)
         VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5)",
        params![
            job_id,
            job_type,
            serde_json::to_string(payload)?,
            max_attempts,
            now_rfc3339(),
        ],
    )?;
    Ok(job_id)
}

/// Claims one claimable job: `pending` with an elapsed/absent
/// `next_retry_at`, or `running` with an elapsed/absent `lease_expires_at`
/// (the latter covers both a crashed worker's job and pre-lease legacy
/// rows). Races against other workers via a conditional `UPDATE ... WHERE
/// status = ?`; loses up to 8 times before giving up on this call.
pub fn claim_next_catalog_job(
    tx: &Transaction<'_>,
    lease_seconds: i64,
) -> Result<Option<CatalogJobRow>> {
    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let lease_expires_at = (now + Duration::seconds(lease_seconds)).to_rfc3339();

    for _attempt in 0..8 {
        let candidate = tx
            .query_row(
                "SELECT job_id, status, attempts FROM catalog_jobs
                 WHERE (status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= ?1))
                    OR (status = 'running' AND (lease_expires_at IS NULL OR lease_expires_at <= ?1))
                 ORDER BY COALESCE(next_retry_at, created_at), created_at
                 LIMIT 1",
                params![now_str],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((job_id, observed_status, _attempts)) = candidate else {
            return Ok(None);
        };

        let affected = tx.execute(
            "UPDATE catalog_jobs
             SET status = 'running', attempts = attempts + 1, lease_expires_at = ?1
             WHERE job_id = ?2 AND status = ?3
                AND (
                    (status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= ?4))
                 OR (status = 'running' AND (lease_expires_at IS NULL OR lease_expires_at <= ?4))
                )",
            params![lease_expires_at, job_id, observed_status, now_str],
        )?;

        if affected == 0 {
            // Lost the race to another worker; try another candidate.
            continue;
        }

        let row = tx.query_row(
            "SELECT job_id, job_type, payload, status, attempts, max_attempts, last_error
             FROM catalog_jobs WHERE job_id = ?1",
            params![job_id],
            |row| {
                let payload_raw: String = row.get(2)?;
                Ok(CatalogJobRow {
                    job_id: row.get(0)?,
                    job_type: row.get(1)?,
                    payload: serde_json::from_str(&payload_raw).unwrap_or(Value::Null),
                    status: row.get(3)?,
                    attempts: row.get(4)?,
                    max_attempts: row.get(5)?,
                    last_error: row.get(6)?,
                })
            },
        )?;
        return Ok(Some(row));
    }
    Ok(None)
}

pub fn mark_catalog_job_done(tx: &Transaction<'_>, job_id: &str) -> Result<()> {
    tx.execute(
        "UPDATE catalog_jobs SET status = 'done', lease_expires_at = NULL WHERE job_id = ?1",
        params![job_id],
    )?;
    Ok(())
}

/// `attempts >= max_attempts -> failed`, else `pending` with
/// `next_retry_at = now + min(300, 2^attempts)` seconds. Lease is cleared
/// either way.
pub fn mark_catalog_job_failed(
    tx: &Transaction<'_>,
    job_id: &str,
    attempts: i64,
    max_attempts: i64,
    error: &str,
) -> Result<()> {
    if attempts >= max_attempts {
        tx.execute(
            "UPDATE catalog_jobs
             SET status = 'failed', lease_expires_at = NULL, last_error = ?1
             WHERE job_id = ?2",
            params![error, job_id],
        )?;
        return Ok(());
    }

    let backoff = memoryhub_retry::catalog_job_backoff_seconds(attempts as u32);
    let next_retry_at = (Utc::now() + Duration::seconds(backoff as i64)).to_rfc3339();
    tx.execute(
        "UPDATE catalog_jobs
         SET status = 'pending', lease_expires_at = NULL, next_retry_at = ?1, last_error = ?2
         WHERE job_id = ?3",
        params![next_retry_at, error, job_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use serde_json::json;

    #[test]
    fn claim_then_fail_schedules_backoff_retry() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        let job_id = enqueue_catalog_job(&tx, "incremental_refresh", &json!({}), 5).unwrap();
        let job = claim_next_catalog_job(&tx, 60).unwrap().unwrap();
        assert_eq!(job.job_id, job_id);
        assert_eq!(job.attempts, 1);
        mark_catalog_job_failed(&tx, &job_id, job.attempts, job.max_attempts, "boom").unwrap();
        tx.commit().unwrap();

        let (status, next_retry): (String, Option<String>) = store
            .conn()
            .query_row(
                "SELECT status, next_retry_at FROM catalog_jobs WHERE job_id = ?1",
                params![job_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "pending");
        assert!(next_retry.is_some());
    }

    #[test]
    fn exhausting_max_attempts_marks_job_failed() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        let job_id = enqueue_catalog_job(&tx, "incremental_refresh", &json!({}), 1).unwrap();
        let job = claim_next_catalog_job(&tx, 60).unwrap().unwrap();
        mark_catalog_job_failed(&tx, &job_id, job.attempts, job.max_attempts, "boom").unwrap();
        tx.commit().unwrap();

        let status: String = store
            .conn()
            .query_row(
                "SELECT status FROM catalog_jobs WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[test]
    fn null_lease_running_job_is_reclaimable() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        tx.execute(
            "INSERT INTO catalog_jobs (job_id, job_type, payload, status, attempts, max_attempts, created_at)
             VALUES ('job_legacy', 'incremental_refresh', '{}', 'running', 1, 5, ?1)",
            params![now_rfc3339()],
        )
        .unwrap();
        let claimed = claim_next_catalog_job(&tx, 60).unwrap().unwrap();
        tx.commit().unwrap();
        assert_eq!(claimed.job_id, "job_legacy");
        assert_eq!(claimed.attempts, 2);
    }

    #[test]
    fn second_claim_on_same_job_finds_nothing_until_lease_elapses() {
        let mut store = Store::connect_in_memory_for_tests("p").unwrap();
        let tx = store.begin_immediate().unwrap();
        enqueue_catalog_job(&tx, "incremental_refresh", &json!({}), 5).unwrap();
        let first = claim_next_catalog_job(&tx, 3600).unwrap();
        let second = claim_next_catalog_job(&tx, 3600).unwrap();
        tx.commit().unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }
}
