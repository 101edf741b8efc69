//! Stable, machine-readable business errors.
//!
//! `BusinessError` is the only error type that crosses the tool-call boundary.
//! Infrastructural failures (I/O, SQL, JSON) propagate as `anyhow::Error`
//! inside the engine and are wrapped into `ErrorCode::ToolCallFailed` at the
//! dispatch edge; they never reach a caller with their internal detail intact.

use serde::{Deserialize, Serialize};

/// Closed, stable taxonomy of business error codes. Serializes to the exact
/// SCREAMING_SNAKE_CASE name external callers already depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidProjectId,
    InvalidPushPayload,
    InvalidContextStamp,
    InvalidConflictStrategy,
    MissingRequiredFields,
    WorkspaceMismatch,
    InvalidAuditQuery,
    ConflictDetected,
    InvalidAcceptanceSample,
    ToolCallFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidProjectId => "INVALID_PROJECT_ID",
            ErrorCode::InvalidPushPayload => "INVALID_PUSH_PAYLOAD",
            ErrorCode::InvalidContextStamp => "INVALID_CONTEXT_STAMP",
            ErrorCode::InvalidConflictStrategy => "INVALID_CONFLICT_STRATEGY",
            ErrorCode::MissingRequiredFields => "MISSING_REQUIRED_FIELDS",
            ErrorCode::WorkspaceMismatch => "WORKSPACE_MISMATCH",
            ErrorCode::InvalidAuditQuery => "INVALID_AUDIT_QUERY",
            ErrorCode::ConflictDetected => "CONFLICT_DETECTED",
            ErrorCode::InvalidAcceptanceSample => "INVALID_ACCEPTANCE_SAMPLE",
            ErrorCode::ToolCallFailed => "TOOL_CALL_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure surfaced to a tool caller. Carries enough structure for a
/// transport to build a JSON-RPC error envelope without re-parsing a message
/// string.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{error_code}: {message}")]
pub struct BusinessError {
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub retryable: bool,
}

impl BusinessError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// The JSON payload a transport places in the `data` field of a JSON-RPC
    /// error object.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "error_code": self.error_code.as_str(),
            "message": self.message,
            "retryable": self.retryable,
        });
        if let Some(details) = &self.details {
            payload["details"] = details.clone();
        }
        payload
    }
}

/// Fixed JSON-RPC error codes. `BUSINESS_ERROR` is the only one
/// `memory-hub` assigns on its own; the rest are named here so a transport
/// can reuse the taxonomy instead of hand-rolling magic numbers.
pub const RPC_CODE_BUSINESS_ERROR: i64 = -32010;
pub const RPC_CODE_INVALID_PARAMS: i64 = -32602;
pub const RPC_CODE_INTERNAL_ERROR: i64 = -32000;
pub const RPC_CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const RPC_CODE_PARSE_ERROR: i64 = -32700;

/// Every `BusinessError` maps to the same JSON-RPC code; the distinguishing
/// information lives in `error_code` inside `data`.
pub fn rpc_code(_err: &BusinessError) -> i64 {
    RPC_CODE_BUSINESS_ERROR
}

/// The `SyncAudit.direction` a tool maps to, including the catch-all used
/// when a dispatcher fails before it can attribute a call to one of the
/// named tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDirection {
    Pull,
    Push,
    ResolveConflict,
    CatalogBrief,
    CatalogHealth,
    ToolError,
}

impl AuditDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditDirection::Pull => "pull",
            AuditDirection::Push => "push",
            AuditDirection::ResolveConflict => "resolve_conflict",
            AuditDirection::CatalogBrief => "catalog_brief",
            AuditDirection::CatalogHealth => "catalog_health",
            AuditDirection::ToolError => "tool_error",
        }
    }
}

impl std::fmt::Display for AuditDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_round_trips_through_json() {
        for code in [
            ErrorCode::InvalidProjectId,
            ErrorCode::ConflictDetected,
            ErrorCode::ToolCallFailed,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(code, back);
        }
    }

    #[test]
    fn business_error_payload_omits_details_when_absent() {
        let err = BusinessError::new(ErrorCode::WorkspaceMismatch, "mismatch");
        let payload = err.to_payload();
        assert!(payload.get("details").is_none());
        assert_eq!(payload["error_code"], "WORKSPACE_MISMATCH");
        assert_eq!(payload["retryable"], false);
    }

    #[test]
    fn business_error_payload_includes_details_when_present() {
        let err = BusinessError::new(ErrorCode::InvalidPushPayload, "bad field")
            .with_details(serde_json::json!({"field": "role_deltas[0].role"}))
            .retryable();
        let payload = err.to_payload();
        assert_eq!(payload["details"]["field"], "role_deltas[0].role");
        assert_eq!(payload["retryable"], true);
    }

    #[test]
    fn all_error_codes_map_to_the_business_rpc_code() {
        let err = BusinessError::new(ErrorCode::ConflictDetected, "conflict");
        assert_eq!(rpc_code(&err), RPC_CODE_BUSINESS_ERROR);
    }
}
