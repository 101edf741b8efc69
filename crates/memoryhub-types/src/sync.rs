//! Request/response payloads for the `session.sync.*` tool surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stamp::ConsistencyStamp;

fn default_max_tokens() -> i64 {
    1200
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub project_id: String,
    pub client_id: String,
    pub session_id: String,
    pub task_prompt: String,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RolePayloadItem {
    pub memory_key: String,
    pub value: Value,
    pub confidence: f64,
    pub version: i64,
    pub updated_at: String,
    pub updated_by_client: String,
    pub source_refs: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RolePayloadBlock {
    pub role: String,
    pub items: Vec<RolePayloadItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenLoopSummary {
    pub loop_id: String,
    pub title: String,
    pub details: Option<String>,
    pub priority: i64,
    pub owner_role: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoffPacketView {
    pub handoff_id: String,
    pub session_id: String,
    pub summary: Value,
    pub ttl_expires_at: String,
    pub created_at: String,
    pub created_by_client: String,
    pub memory_version: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullTrace {
    pub policy: String,
    pub requested_task_type: String,
    pub resolved_task_type: String,
    pub sources: Vec<SourceRef>,
    pub catalog: CatalogTrace,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogTrace {
    pub freshness: String,
    pub cache_hit: bool,
    pub refresh_requested: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullResponse {
    pub sync_id: String,
    pub context_brief: String,
    pub memory_context_brief: String,
    pub catalog_brief: String,
    pub role_payloads: Vec<RolePayloadBlock>,
    pub open_loops_top: Vec<OpenLoopSummary>,
    pub handoff_latest: Option<HandoffPacketView>,
    pub consistency_stamp: ConsistencyStamp,
    pub evidence: Vec<Value>,
    pub trace: PullTrace,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleDeltaInput {
    pub role: String,
    pub memory_key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub source_refs: Vec<Value>,
}

fn default_confidence() -> f64 {
    0.7
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionDeltaInput {
    #[serde(default)]
    pub decision_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_decision_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub source_refs: Vec<Value>,
}

fn default_decision_confidence() -> f64 {
    0.8
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OpenLoopClosedInput {
    LoopId(String),
    Object {
        loop_id: Option<String>,
        title: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenLoopNewInput {
    #[serde(default)]
    pub loop_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub owner_role: Option<String>,
}

fn default_priority() -> i64 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushRequest {
    pub project_id: String,
    pub client_id: String,
    pub session_id: String,
    #[serde(default)]
    pub context_stamp: Option<Value>,
    pub session_summary: String,
    #[serde(default)]
    pub role_deltas: Vec<RoleDeltaInput>,
    #[serde(default)]
    pub decisions_delta: Vec<DecisionDeltaInput>,
    #[serde(default)]
    pub open_loops_new: Vec<OpenLoopNewInput>,
    #[serde(default)]
    pub open_loops_closed: Vec<OpenLoopClosedInput>,
    #[serde(default)]
    pub files_touched: Vec<String>,
    #[serde(default)]
    pub workspace_root: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub role: String,
    pub memory_key: String,
    pub base_version: i64,
    pub current_version: i64,
    pub theirs: Value,
    pub updated_at: String,
    pub updated_by_client: String,
    pub version_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedRoleDelta {
    pub version_id: String,
    pub role: String,
    pub memory_key: String,
    pub memory_version: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedOpenLoop {
    pub loop_id: String,
    pub title: String,
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedHandoff {
    pub handoff_id: String,
    pub ttl_expires_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushApplied {
    pub role_deltas: Vec<AppliedRoleDelta>,
    pub open_loops_new: Vec<AppliedOpenLoop>,
    pub open_loops_closed: Vec<String>,
    pub handoff: AppliedHandoff,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogJobRef {
    pub job_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushResponse {
    Ok {
        sync_id: String,
        memory_version: i64,
        consistency_stamp: ConsistencyStamp,
        conflicts: Vec<Conflict>,
        applied: PushApplied,
        catalog_job: CatalogJobRef,
    },
    NeedsResolution {
        sync_id: String,
        memory_version: i64,
        conflicts: Vec<Conflict>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveConflictRequest {
    pub project_id: String,
    pub client_id: String,
    pub session_id: String,
    pub strategy: String,
    #[serde(default)]
    pub role_deltas: Vec<RoleDeltaInput>,
    #[serde(default)]
    pub session_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveConflictResponse {
    pub sync_id: String,
    pub status: String,
    pub strategy: String,
    pub memory_version: i64,
    pub consistency_stamp: Option<ConsistencyStamp>,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditListRequest {
    pub project_id: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
}

fn default_audit_limit() -> i64 {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditItem {
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

#[derive(Debug, Clone, Serialize)]
pub struct AuditListResponse {
    pub items: Vec<AuditItem>,
}
