//! `session.sync.push` and `session.sync.resolve_conflict`.

use anyhow::Result;
use memoryhub_store::{NewOpenLoop, RoleDeltaWrite, Store};
use memoryhub_types::{
    parse_context_stamp, validate_push_payload, AppliedHandoff, AppliedOpenLoop, AppliedRoleDelta,
    BusinessError, CatalogJobRef, ConsistencyStamp, ConsistencyStatus, Conflict, DecisionDeltaInput,
    ErrorCode, OpenLoopClosedInput, PushApplied, PushRequest, PushResponse,
    ResolveConflictRequest, ResolveConflictResponse, Role,
};
use serde_json::json;

use crate::Engine;

fn business(err: BusinessError) -> anyhow::Error {
    anyhow::anyhow!(err)
}

pub fn push(engine: &Engine, request: &PushRequest) -> Result<PushResponse> {
    validate_push_payload(request).map_err(business)?;

    let base = parse_context_stamp(request.context_stamp.as_ref()).map_err(business)?;

    let mut store = Store::connect(&engine.root, &request.project_id, engine.busy_timeout_ms())?;

    memoryhub_store::enforce_workspace_binding(store.conn(), request.workspace_root.as_deref())
        .map_err(business)?;

    let sync_id = memoryhub_store::new_sync_id();
    let started = std::time::Instant::now();

    let result = push_inner(engine, &mut store, request, base, &sync_id);

    match &result {
        Ok(response) => {
            let audit_tx = store.begin_immediate()?;
            let error_code = match response {
                PushResponse::NeedsResolution { .. } => Some("CONFLICT_DETECTED"),
                PushResponse::Ok { .. } => None,
            };
            memoryhub_store::insert_sync_audit(
                &audit_tx,
                &sync_id,
                "push",
                &request.client_id,
                &request.session_id,
                &push_request_for_audit(request),
                &serde_json::to_value(response)?,
                error_code,
                Some(started.elapsed().as_millis() as i64),
            )?;
            audit_tx.commit()?;
        }
        Err(err) => {
            tracing::warn!(project_id = %request.project_id, error = %err, "push failed");
        }
    }

    result
}

fn push_inner(
    engine: &Engine,
    store: &mut Store,
    request: &PushRequest,
    base: Option<i64>,
    sync_id: &str,
) -> Result<PushResponse> {
    if let Some(workspace_root) = &request.workspace_root {
        memoryhub_store::bind_workspace_root(store.conn(), workspace_root)?;
    }

    let role_deltas = build_role_deltas(request)?;

    let tx = store.begin_immediate()?;
    let meta = memoryhub_store::project_meta(&tx)?;
    let current_version = meta.memory_version;

    if let Some(base) = base {
        if base < current_version {
            let conflicts = memoryhub_store::find_conflicts(&tx, &role_deltas, base)?;
            if !conflicts.is_empty() {
                tx.commit()?;
                return Ok(PushResponse::NeedsResolution {
                    sync_id: sync_id.to_string(),
                    memory_version: current_version,
                    conflicts: conflicts
                        .into_iter()
                        .map(|c| to_response_conflict(c, base))
                        .collect(),
                });
            }
        }
    }

    let new_version = current_version + 1;
    memoryhub_store::bump_memory_version(&tx, new_version)?;

    let mut applied_role_deltas = Vec::with_capacity(role_deltas.len());
    for delta in &role_deltas {
        let applied = memoryhub_store::upsert_role_delta(&tx, delta, new_version)?;
        applied_role_deltas.push(AppliedRoleDelta {
            version_id: applied.version_id,
            role: applied.role,
            memory_key: applied.memory_key,
            memory_version: new_version,
        });
    }

    let new_loops: Vec<NewOpenLoop> = request
        .open_loops_new
        .iter()
        .filter(|l| !l.title.trim().is_empty())
        .map(|l| NewOpenLoop {
            loop_id: l.loop_id.clone(),
            title: l.title.clone(),
            details: l.details.clone(),
            priority: l.priority,
            owner_role: l.owner_role.clone(),
        })
        .collect();
    let inserted_loops =
        memoryhub_store::insert_open_loops(&tx, &new_loops, &request.client_id, new_version)?;

    let (close_ids, close_titles) = split_closed(&request.open_loops_closed);
    let closed_loops =
        memoryhub_store::close_open_loops(&tx, &close_ids, &close_titles, &request.client_id)?;

    let handoff_summary = json!({
        "session_summary": request.session_summary,
        "role_deltas_count": role_deltas.len(),
        "decisions_count": request.decisions_delta.len(),
        "files_touched": request.files_touched,
        "open_loops_new": inserted_loops.iter().map(|l| &l.title).collect::<Vec<_>>(),
        "open_loops_closed": closed_loops,
        "next_actions": inserted_loops.iter().take(3).map(|l| l.title.clone()).collect::<Vec<_>>(),
    });
    let handoff = memoryhub_store::insert_handoff_packet(
        &tx,
        &request.session_id,
        &handoff_summary,
        engine.config.policy.handoff_ttl_chrono(),
        &request.client_id,
        new_version,
    )?;

    let job_id = memoryhub_store::enqueue_catalog_job(
        &tx,
        "incremental_refresh",
        &json!({
            "reason": "push",
            "files_touched": request.files_touched,
            "memory_version": new_version,
            "sync_id": sync_id,
            "session_id": request.session_id,
            "workspace_root": request.workspace_root,
        }),
        engine.config.store.max_job_attempts,
    )?;

    let previous_catalog_version = memoryhub_store::catalog_health_row(&tx)?
        .catalog_version
        .unwrap_or_default();
    memoryhub_store::insert_consistency_link(
        &tx,
        sync_id,
        new_version,
        &previous_catalog_version,
        ConsistencyStatus::Degraded,
    )?;

    tx.commit()?;

    Ok(PushResponse::Ok {
        sync_id: sync_id.to_string(),
        memory_version: new_version,
        consistency_stamp: ConsistencyStamp {
            memory_version: new_version,
            catalog_version: previous_catalog_version,
            consistency: ConsistencyStatus::Degraded,
        },
        conflicts: vec![],
        applied: PushApplied {
            role_deltas: applied_role_deltas,
            open_loops_new: inserted_loops
                .into_iter()
                .map(|l| AppliedOpenLoop {
                    loop_id: l.loop_id,
                    title: l.title,
                    priority: l.priority,
                })
                .collect(),
            open_loops_closed: closed_loops,
            handoff: AppliedHandoff {
                handoff_id: handoff.handoff_id,
                ttl_expires_at: handoff.ttl_expires_at,
            },
        },
        catalog_job: CatalogJobRef {
            job_id,
            status: "pending".to_string(),
        },
    })
}

/// Folds `role_deltas` and `decisions_delta` (each decision becomes a
/// synthetic `architect` delta) into one write list.
fn build_role_deltas(request: &PushRequest) -> Result<Vec<RoleDeltaWrite>> {
    let mut writes = Vec::with_capacity(request.role_deltas.len() + request.decisions_delta.len());
    for delta in &request.role_deltas {
        writes.push(RoleDeltaWrite {
            role: Role::normalize(&delta.role).map_err(business)?.as_str().to_string(),
            memory_key: delta.memory_key.clone(),
            value: delta.value.clone(),
            confidence: delta.confidence,
            source_refs: json!(delta.source_refs),
            created_by_client: request.client_id.clone(),
        });
    }
    for (i, decision) in request.decisions_delta.iter().enumerate() {
        writes.push(RoleDeltaWrite {
            role: Role::Architect.as_str().to_string(),
            memory_key: decision_memory_key(decision, i),
            value: json!({
                "title": decision.title,
                "rationale": decision.rationale,
                "status": decision.status.clone().unwrap_or_else(|| "active".to_string()),
            }),
            confidence: decision.confidence,
            source_refs: json!(decision.source_refs),
            created_by_client: request.client_id.clone(),
        });
    }
    Ok(writes)
}

fn decision_memory_key(decision: &DecisionDeltaInput, index: usize) -> String {
    decision.decision_id.clone().unwrap_or_else(|| {
        format!("decision::{}::{}", slugify(&decision.title), index)
    })
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_dash = false;
    for ch in title.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn split_closed(items: &[OpenLoopClosedInput]) -> (Vec<String>, Vec<String>) {
    let mut ids = Vec::new();
    let mut titles = Vec::new();
    for item in items {
        match item {
            OpenLoopClosedInput::LoopId(id) => ids.push(id.clone()),
            OpenLoopClosedInput::Object { loop_id, title } => {
                if let Some(id) = loop_id {
                    ids.push(id.clone());
                }
                if let Some(title) = title {
                    titles.push(title.clone());
                }
            }
        }
    }
    (ids, titles)
}

fn to_response_conflict(c: memoryhub_store::VersionConflict, base_version: i64) -> Conflict {
    Conflict {
        role: c.role,
        memory_key: c.memory_key,
        base_version,
        current_version: c.current_version,
        theirs: c.theirs,
        updated_at: c.updated_at,
        updated_by_client: c.updated_by_client,
        version_id: c.version_id,
    }
}

fn push_request_for_audit(request: &PushRequest) -> serde_json::Value {
    serde_json::to_value(request).unwrap_or(serde_json::Value::Null)
}

pub fn resolve_conflict(
    engine: &Engine,
    request: &ResolveConflictRequest,
) -> Result<ResolveConflictResponse> {
    let mut store = Store::connect(&engine.root, &request.project_id, engine.busy_timeout_ms())?;
    let sync_id = memoryhub_store::new_sync_id();

    let response = match request.strategy.as_str() {
        "accept_theirs" => {
            let meta = memoryhub_store::project_meta(store.conn())?;
            let catalog_version = memoryhub_store::catalog_health_row(store.conn())?
                .catalog_version
                .unwrap_or_default();
            ResolveConflictResponse {
                sync_id: sync_id.clone(),
                status: "no_write".to_string(),
                strategy: request.strategy.clone(),
                memory_version: meta.memory_version,
                consistency_stamp: Some(ConsistencyStamp {
                    memory_version: meta.memory_version,
                    catalog_version,
                    consistency: ConsistencyStatus::Unknown,
                }),
                conflicts: vec![],
            }
        }
        "keep_mine" => {
            let forced = force_push(engine, &mut store, request, request.role_deltas.clone())?;
            resolve_from_push(&sync_id, request, forced)
        }
        "merge_note" => {
            let mut merged = Vec::with_capacity(request.role_deltas.len());
            for delta in &request.role_deltas {
                let role = Role::normalize(&delta.role).map_err(business)?;
                let mine = memoryhub_store::current_role_value(
                    store.conn(),
                    role.as_str(),
                    &delta.memory_key,
                )?
                .unwrap_or(serde_json::Value::Null);
                let mut merged_delta = delta.clone();
                merged_delta.value = json!({
                    "resolution": "merge_note",
                    "mine": mine,
                    "theirs": delta.value,
                    "note": "auto merged by merge_note strategy",
                });
                merged.push(merged_delta);
            }
            let forced = force_push(engine, &mut store, request, merged)?;
            resolve_from_push(&sync_id, request, forced)
        }
        other => {
            return Err(business(BusinessError::new(
                ErrorCode::InvalidConflictStrategy,
                format!("unknown conflict resolution strategy: {other}"),
            )))
        }
    };

    let audit_tx = store.begin_immediate()?;
    memoryhub_store::insert_sync_audit(
        &audit_tx,
        &sync_id,
        "resolve_conflict",
        &request.client_id,
        &request.session_id,
        &serde_json::to_value(request).unwrap_or(serde_json::Value::Null),
        &serde_json::to_value(&response)?,
        None,
        None,
    )?;
    audit_tx.commit()?;

    Ok(response)
}

fn force_push(
    engine: &Engine,
    store: &mut Store,
    request: &ResolveConflictRequest,
    role_deltas: Vec<memoryhub_types::RoleDeltaInput>,
) -> Result<PushResponse> {
    let forced_request = PushRequest {
        project_id: request.project_id.clone(),
        client_id: request.client_id.clone(),
        session_id: request.session_id.clone(),
        context_stamp: None,
        session_summary: request
            .session_summary
            .clone()
            .unwrap_or_else(|| "resolved via conflict strategy".to_string()),
        role_deltas,
        decisions_delta: vec![],
        open_loops_new: vec![],
        open_loops_closed: vec![],
        files_touched: vec![],
        workspace_root: None,
    };
    validate_push_payload(&forced_request).map_err(business)?;
    push_inner(engine, store, &forced_request, None, &memoryhub_store::new_sync_id())
}

fn resolve_from_push(
    sync_id: &str,
    request: &ResolveConflictRequest,
    pushed: PushResponse,
) -> ResolveConflictResponse {
    match pushed {
        PushResponse::Ok {
            memory_version,
            consistency_stamp,
            ..
        } => ResolveConflictResponse {
            sync_id: sync_id.to_string(),
            status: "resolved".to_string(),
            strategy: request.strategy.clone(),
            memory_version,
            consistency_stamp: Some(consistency_stamp),
            conflicts: vec![],
        },
        PushResponse::NeedsResolution {
            memory_version,
            conflicts,
            ..
        } => ResolveConflictResponse {
            sync_id: sync_id.to_string(),
            status: "needs_resolution".to_string(),
            strategy: request.strategy.clone(),
            memory_version,
            consistency_stamp: None,
            conflicts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoryhub_config::Config;
    use memoryhub_types::RoleDeltaInput;

    fn engine_for(root: &std::path::Path) -> Engine {
        Engine::new(root.to_path_buf(), Config::default())
    }

    fn base_request(project_id: &str) -> PushRequest {
        PushRequest {
            project_id: project_id.to_string(),
            client_id: "c1".to_string(),
            session_id: "s1".to_string(),
            context_stamp: None,
            session_summary: "did work".to_string(),
            role_deltas: vec![RoleDeltaInput {
                role: "pm".to_string(),
                memory_key: "goal".to_string(),
                value: json!("ship it"),
                confidence: 0.9,
                source_refs: vec![],
            }],
            decisions_delta: vec![],
            open_loops_new: vec![],
            open_loops_closed: vec![],
            files_touched: vec![],
            workspace_root: None,
        }
    }

    #[test]
    fn push_bumps_memory_version_and_enqueues_a_job() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        let response = push(&engine, &base_request("p1")).unwrap();
        match response {
            PushResponse::Ok {
                memory_version,
                catalog_job,
                ..
            } => {
                assert_eq!(memory_version, 1);
                assert_eq!(catalog_job.status, "pending");
            }
            PushResponse::NeedsResolution { .. } => panic!("expected ok"),
        }
    }

    #[test]
    fn stale_context_stamp_yields_needs_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        push(&engine, &base_request("p1")).unwrap();

        let mut second = base_request("p1");
        second.context_stamp = Some(json!({"memory_version": 0}));
        second.role_deltas[0].value = json!("ship it faster");
        let response = push(&engine, &second).unwrap();
        assert!(matches!(response, PushResponse::NeedsResolution { .. }));
    }

    #[test]
    fn merge_note_resolution_force_pushes_a_merged_value() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        push(&engine, &base_request("p1")).unwrap();

        let mut second = base_request("p1");
        second.context_stamp = Some(json!({"memory_version": 0}));
        second.role_deltas[0].value = json!("ship it faster");
        let needs_resolution = push(&engine, &second).unwrap();
        assert!(matches!(needs_resolution, PushResponse::NeedsResolution { .. }));

        let resolved = resolve_conflict(
            &engine,
            &ResolveConflictRequest {
                project_id: "p1".to_string(),
                client_id: "c1".to_string(),
                session_id: "s1".to_string(),
                strategy: "merge_note".to_string(),
                role_deltas: vec![RoleDeltaInput {
                    role: "pm".to_string(),
                    memory_key: "goal".to_string(),
                    value: json!("ship it faster"),
                    confidence: 0.9,
                    source_refs: vec![],
                }],
                session_summary: None,
            },
        )
        .unwrap();
        assert_eq!(resolved.status, "resolved");
        assert_eq!(resolved.memory_version, 2);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        push(&engine, &base_request("p1")).unwrap();
        let err = resolve_conflict(
            &engine,
            &ResolveConflictRequest {
                project_id: "p1".to_string(),
                client_id: "c1".to_string(),
                session_id: "s1".to_string(),
                strategy: "give_up".to_string(),
                role_deltas: vec![],
                session_summary: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("INVALID_CONFLICT_STRATEGY"));
    }

    #[test]
    fn workspace_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        let mut first = base_request("p1");
        first.workspace_root = Some("/ws_a".to_string());
        push(&engine, &first).unwrap();

        let mut second = base_request("p1");
        second.workspace_root = Some("/ws_b".to_string());
        let err = push(&engine, &second).unwrap_err();
        assert!(err.to_string().contains("WORKSPACE_MISMATCH"));
    }
}
