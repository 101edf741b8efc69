//! `catalog_worker::run_batch`: processes pending/reclaimable catalog jobs
//! up to a batch limit, one job at a time, one commit per phase.

use anyhow::Result;
use memoryhub_retry::{calculate_delay, RetryPolicy};
use memoryhub_store::Store;
use memoryhub_types::ConsistencyStatus;

use crate::Engine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub lock_failures: i64,
}

/// Runs up to `batch_limit` jobs for `project_id`. A job is claimed in its
/// own `BEGIN IMMEDIATE`, which retries up to 3 times with exponential
/// backoff on lock contention (`memoryhub_retry::RetryPolicy::LockContention`);
/// retry exhaustion stops the batch early rather than panicking.
pub fn run_batch(engine: &Engine, project_id: &str, batch_limit: usize) -> Result<BatchStats> {
    let mut store = Store::connect(&engine.root, project_id, engine.busy_timeout_ms())?;
    let lease_seconds = engine.config.store.lease_seconds;
    let mut stats = BatchStats::default();

    for _ in 0..batch_limit {
        let claim = claim_with_retry(&mut store, lease_seconds);
        let job = match claim {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(()) => {
                stats.lock_failures += 1;
                break;
            }
        };
        stats.processed += 1;

        match process_job(engine, &mut store, &job) {
            Ok(()) => stats.succeeded += 1,
            Err(err) => {
                stats.failed += 1;
                let fail_tx = store.begin_immediate()?;
                memoryhub_store::mark_catalog_job_failed(
                    &fail_tx,
                    &job.job_id,
                    job.attempts,
                    job.max_attempts,
                    &err.to_string(),
                )?;
                fail_tx.commit()?;
                tracing::warn!(job_id = %job.job_id, error = %err, "catalog job failed");
            }
        }
    }

    Ok(stats)
}

/// Retries `BEGIN IMMEDIATE` + claim under `RetryPolicy::LockContention`;
/// `Err(())` signals the batch should stop with a recorded `lock_failures`
/// rather than propagate the lock error.
fn claim_with_retry(
    store: &mut Store,
    lease_seconds: i64,
) -> Result<Option<memoryhub_store::CatalogJobRow>, ()> {
    let config = RetryPolicy::LockContention.to_config();
    let mut attempt = 1;
    loop {
        match store.begin_immediate() {
            Ok(tx) => {
                let claimed = memoryhub_store::claim_next_catalog_job(&tx, lease_seconds)
                    .and_then(|job| {
                        tx.commit()?;
                        Ok(job)
                    });
                return claimed.map_err(|_| ());
            }
            Err(_) => {
                if attempt >= config.max_attempts {
                    return Err(());
                }
                std::thread::sleep(calculate_delay(&config, attempt));
                attempt += 1;
            }
        }
    }
}

fn process_job(
    engine: &Engine,
    store: &mut Store,
    job: &memoryhub_store::CatalogJobRow,
) -> Result<()> {
    let bound_workspace = memoryhub_store::project_meta(store.conn())?.workspace_root;
    let workspace_root = job
        .payload
        .get("workspace_root")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or(bound_workspace)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| engine.root.clone());

    let scan = memoryhub_catalog::build_snapshot(
        &workspace_root,
        engine.config.catalog.max_file_size_bytes,
        None,
    )?;

    let sync_id = job
        .payload
        .get("sync_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("job:{}", job.job_id));
    let meta = memoryhub_store::project_meta(store.conn())?;
    let memory_version = job
        .payload
        .get("memory_version")
        .and_then(|v| v.as_i64())
        .unwrap_or(meta.memory_version);

    let tx = store.begin_immediate()?;
    memoryhub_store::replace_catalog_snapshot(&tx, &scan.snapshot, scan.total_files, true)?;
    memoryhub_store::insert_consistency_link(
        &tx,
        &sync_id,
        memory_version,
        &scan.snapshot.catalog_version,
        ConsistencyStatus::Ok,
    )?;
    memoryhub_store::mark_catalog_job_done(&tx, &job.job_id)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoryhub_config::Config;
    use serde_json::json;

    fn engine_for(root: &std::path::Path) -> Engine {
        Engine::new(root.to_path_buf(), Config::default())
    }

    #[test]
    fn empty_queue_returns_zeroed_stats() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        let stats = run_batch(&engine, "p1", 20).unwrap();
        assert_eq!(stats, BatchStats::default());
    }

    #[test]
    fn a_pending_job_is_processed_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        std::fs::write(dir.path().join("main.py"), b"import os\n").unwrap();

        let mut store = Store::connect(dir.path(), "p1", 2000).unwrap();
        let tx = store.begin_immediate().unwrap();
        memoryhub_store::enqueue_catalog_job(
            &tx,
            "incremental_refresh",
            &json!({"workspace_root": dir.path().to_string_lossy()}),
            5,
        )
        .unwrap();
        tx.commit().unwrap();

        let stats = run_batch(&engine, "p1", 20).unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 0);

        let health = memoryhub_store::catalog_health_row(store.conn()).unwrap();
        assert_eq!(health.indexed_files, 1);
    }
}
