//! `session.sync.audit.list`: a read-only window onto `sync_audit`.

use anyhow::Result;
use memoryhub_store::Store;
use memoryhub_types::{AuditItem, AuditListRequest, AuditListResponse, BusinessError, ErrorCode};

use crate::Engine;

const MAX_LIMIT: i64 = 500;
const MIN_LIMIT: i64 = 1;

pub fn audit_list(engine: &Engine, request: &AuditListRequest) -> Result<AuditListResponse> {
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&request.limit) {
        return Err(anyhow::anyhow!(BusinessError::new(
            ErrorCode::InvalidAuditQuery,
            format!("limit must be in [{MIN_LIMIT}, {MAX_LIMIT}]"),
        )));
    }

    let store = Store::connect(&engine.root, &request.project_id, engine.busy_timeout_ms())?;
    let rows =
        memoryhub_store::list_sync_audit(store.conn(), request.direction.as_deref(), request.limit)?;

    Ok(AuditListResponse {
        items: rows
            .into_iter()
            .map(|row| AuditItem {
                sync_id: row.sync_id,
                direction: row.direction,
                client_id: row.client_id,
                session_id: row.session_id,
                request: row.request,
                response: row.response,
                error_code: row.error_code,
                latency_ms: row.latency_ms,
                created_at: row.created_at,
            })
            .collect(),
    })
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
    fn limit_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        let request = AuditListRequest {
            project_id: "p1".to_string(),
            direction: None,
            limit: 0,
        };
        let err = audit_list(&engine, &request).unwrap_err();
        assert!(err.to_string().contains("INVALID_AUDIT_QUERY"));
    }

    #[test]
    fn lists_entries_written_by_a_prior_pull() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        let mut store =
            Store::connect(&engine.root, "p1", engine.busy_timeout_ms()).unwrap();
        let tx = store.begin_immediate().unwrap();
        memoryhub_store::insert_sync_audit(
            &tx,
            "sync_1",
            "pull",
            "c1",
            "s1",
            &json!({}),
            &json!({}),
            None,
            Some(4),
        )
        .unwrap();
        tx.commit().unwrap();

        let request = AuditListRequest {
            project_id: "p1".to_string(),
            direction: Some("pull".to_string()),
            limit: 50,
        };
        let response = audit_list(&engine, &request).unwrap();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].sync_id, "sync_1");
    }
}
