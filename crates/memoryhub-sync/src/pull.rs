//! `session.sync.pull`: read-only context assembly for a session's start.

use anyhow::Result;
use memoryhub_store::Store;
use memoryhub_types::{
    ConsistencyStamp, ConsistencyStatus, CatalogTrace, HandoffPacketView, OpenLoopSummary,
    PullRequest, PullResponse, PullTrace, RolePayloadBlock, RolePayloadItem, SourceRef,
};
use memoryhub_policy::{build_context_brief, classify_task_type, select_roles, RoleBriefSection};
use serde_json::json;

use crate::catalog_brief::catalog_brief_for_pull;
use crate::Engine;

const ROLE_PAYLOAD_LIMIT: i64 = 8;
const OPEN_LOOP_LIMIT: i64 = 3;

pub fn pull(engine: &Engine, request: &PullRequest) -> Result<PullResponse> {
    memoryhub_types::validate_project_id(&request.project_id)
        .map_err(|e: memoryhub_types::BusinessError| anyhow::anyhow!(e))?;

    let mut store = Store::connect(&engine.root, &request.project_id, engine.busy_timeout_ms())?;
    let sync_id = memoryhub_store::new_sync_id();

    let requested_task_type = request.task_type.clone().unwrap_or_else(|| "auto".to_string());
    let task_type = classify_task_type(request.task_type.as_deref(), &request.task_prompt);
    let roles = select_roles(task_type);

    let mut sources = Vec::new();
    let mut evidence = Vec::new();
    let mut role_sections = Vec::with_capacity(roles.len());
    let mut role_payloads = Vec::with_capacity(roles.len());

    for role in &roles {
        let items = memoryhub_store::recent_role_payloads(
            store.conn(),
            role.as_str(),
            ROLE_PAYLOAD_LIMIT,
        )?;
        for item in &items {
            sources.push(SourceRef {
                kind: "role_state".to_string(),
                fields: json!({
                    "role": role.as_str(),
                    "memory_key": item.memory_key,
                    "version": item.version,
                }),
            });
            evidence.push(json!({
                "kind": "role_state",
                "role": role.as_str(),
                "memory_key": item.memory_key,
                "value": item.value,
                "version": item.version,
            }));
        }
        role_payloads.push(RolePayloadBlock {
            role: role.as_str().to_string(),
            items: items
                .iter()
                .map(|i| RolePayloadItem {
                    memory_key: i.memory_key.clone(),
                    value: i.value.clone(),
                    confidence: i.confidence,
                    version: i.version,
                    updated_at: i.updated_at.clone(),
                    updated_by_client: i.updated_by_client.clone(),
                    source_refs: i.source_refs.clone(),
                })
                .collect(),
        });
        role_sections.push(RoleBriefSection { role: *role, items });
    }

    let open_loops = memoryhub_store::top_open_loops(store.conn(), OPEN_LOOP_LIMIT)?;
    for loop_row in &open_loops {
        sources.push(SourceRef {
            kind: "open_loop".to_string(),
            fields: json!({"loop_id": loop_row.loop_id}),
        });
        evidence.push(json!({
            "kind": "open_loop",
            "loop_id": loop_row.loop_id,
            "title": loop_row.title,
            "priority": loop_row.priority,
        }));
    }

    let handoff = memoryhub_store::latest_handoff_packet(store.conn())?;
    if let Some(packet) = &handoff {
        sources.push(SourceRef {
            kind: "handoff".to_string(),
            fields: json!({"handoff_id": packet.handoff_id}),
        });
        evidence.push(json!({
            "kind": "handoff",
            "handoff_id": packet.handoff_id,
            "summary": packet.summary,
        }));
    }

    let memory_context_brief =
        build_context_brief(&role_sections, &open_loops, handoff.as_ref(), request.max_tokens);

    let catalog_outcome =
        catalog_brief_for_pull(engine, &mut store, &request.project_id, request, task_type)?;

    let context_brief = format!("{memory_context_brief}\n\n{}", catalog_outcome.brief.catalog_brief);

    let project_meta = memoryhub_store::project_meta(store.conn())?;
    let consistency_stamp = ConsistencyStamp {
        memory_version: project_meta.memory_version,
        catalog_version: catalog_outcome.brief.catalog_version.clone(),
        consistency: if catalog_outcome.brief.cache_hit || catalog_outcome.fresh {
            ConsistencyStatus::Ok
        } else {
            ConsistencyStatus::Degraded
        },
    };
    let response = PullResponse {
        sync_id: sync_id.clone(),
        context_brief,
        memory_context_brief,
        catalog_brief: catalog_outcome.brief.catalog_brief.clone(),
        role_payloads,
        open_loops_top: open_loops
            .into_iter()
            .map(|l| OpenLoopSummary {
                loop_id: l.loop_id,
                title: l.title,
                details: l.details,
                priority: l.priority,
                owner_role: l.owner_role,
                created_at: l.created_at,
            })
            .collect(),
        handoff_latest: handoff.map(|h| HandoffPacketView {
            handoff_id: h.handoff_id,
            session_id: h.session_id,
            summary: h.summary,
            ttl_expires_at: h.ttl_expires_at,
            created_at: h.created_at,
            created_by_client: h.created_by_client,
            memory_version: h.memory_version,
        }),
        consistency_stamp,
        evidence,
        trace: PullTrace {
            policy: "keyword_bucket_v1".to_string(),
            requested_task_type,
            resolved_task_type: task_type.as_str().to_string(),
            sources,
            catalog: CatalogTrace {
                freshness: catalog_outcome.brief.freshness.as_str().to_string(),
                cache_hit: catalog_outcome.brief.cache_hit,
                refresh_requested: catalog_outcome.brief.refresh_requested,
            },
        },
    };

    let audit_tx = store.begin_immediate()?;
    memoryhub_store::insert_sync_audit(
        &audit_tx,
        &sync_id,
        "pull",
        &request.client_id,
        &request.session_id,
        &pull_request_for_audit(request),
        &serde_json::to_value(&response)?,
        None,
        None,
    )?;
    audit_tx.commit()?;

    Ok(response)
}

fn pull_request_for_audit(request: &PullRequest) -> serde_json::Value {
    json!({
        "project_id": request.project_id,
        "client_id": request.client_id,
        "session_id": request.session_id,
        "task_prompt": request.task_prompt,
        "task_type": request.task_type,
        "max_tokens": request.max_tokens,
    })
}
