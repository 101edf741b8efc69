//! Domain types and business errors shared by every `memoryhub-*` crate.
//!
//! Nothing in this crate touches SQLite, the filesystem or git; it is the
//! vocabulary the store, policy, catalog, drift and sync crates all speak.

pub mod catalog;
pub mod errors;
pub mod role;
pub mod stamp;
pub mod sync;
pub mod validate;

pub use catalog::{
    CatalogBriefRequest, CatalogBriefResponse, CatalogEdge, CatalogFile, CatalogFreshness,
    CatalogHealthRequest, CatalogHealthResponse, CatalogJobStatus, CatalogSnapshot, DriftMethod,
    DriftSummary, ImportSourceType,
};
pub use errors::{
    rpc_code, AuditDirection, BusinessError, ErrorCode, RPC_CODE_BUSINESS_ERROR,
    RPC_CODE_INTERNAL_ERROR, RPC_CODE_INVALID_PARAMS, RPC_CODE_METHOD_NOT_FOUND,
    RPC_CODE_PARSE_ERROR,
};
pub use role::{Role, TaskType};
pub use stamp::{
    make_context_stamp, parse_context_stamp, ConsistencyStamp, ConsistencyStatus,
    ContextStampInput,
};
pub use sync::{
    AppliedHandoff, AppliedOpenLoop, AppliedRoleDelta, AuditItem, AuditListRequest,
    AuditListResponse, CatalogJobRef, CatalogTrace, Conflict, DecisionDeltaInput,
    HandoffPacketView, OpenLoopClosedInput, OpenLoopNewInput, OpenLoopSummary, PullRequest,
    PullResponse, PullTrace, PushApplied, PushRequest, PushResponse, ResolveConflictRequest,
    ResolveConflictResponse, RoleDeltaInput, RolePayloadBlock, RolePayloadItem, SourceRef,
};
pub use validate::validate_push_payload;

/// Project id rule: `^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$`, no `..` segment, no
/// leading/trailing whitespace. Shared by the store (write path) and any
/// caller that wants to fail fast before round-tripping to SQLite.
pub fn validate_project_id(raw: &str) -> Result<(), BusinessError> {
    if raw != raw.trim() {
        return Err(BusinessError::new(
            ErrorCode::InvalidProjectId,
            "project_id must not have leading or trailing whitespace",
        ));
    }
    if raw.is_empty() || raw.len() > 64 {
        return Err(BusinessError::new(
            ErrorCode::InvalidProjectId,
            "project_id must be 1-64 characters",
        ));
    }
    let mut chars = raw.chars();
    let first = chars.next().expect("checked non-empty above");
    if !first.is_ascii_alphanumeric() {
        return Err(BusinessError::new(
            ErrorCode::InvalidProjectId,
            "project_id must start with an alphanumeric character",
        ));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-') {
        return Err(BusinessError::new(
            ErrorCode::InvalidProjectId,
            "project_id may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    if raw.contains("..") {
        return Err(BusinessError::new(
            ErrorCode::InvalidProjectId,
            "project_id must not contain '..'",
        ));
    }
    Ok(())
}
