//! Payload validation for `session.sync.push` and friends. Separate from
//! `errors.rs` so the error taxonomy stays free of domain-shape knowledge.

use crate::errors::{BusinessError, ErrorCode};
use crate::role::Role;
use crate::sync::{OpenLoopClosedInput, PushRequest};

fn require_non_empty(field: &str, value: &str) -> Result<(), BusinessError> {
    if value.trim().is_empty() {
        return Err(BusinessError::new(
            ErrorCode::MissingRequiredFields,
            format!("{field} must not be empty"),
        ));
    }
    Ok(())
}

/// Checks every field `push` depends on before it opens a write transaction.
/// Does not touch `context_stamp` parsing — that is
/// [`crate::stamp::parse_context_stamp`]'s job, called separately so its
/// own `INVALID_CONTEXT_STAMP` error is distinguishable from the payload
/// shape errors here.
pub fn validate_push_payload(request: &PushRequest) -> Result<(), BusinessError> {
    require_non_empty("project_id", &request.project_id)?;
    require_non_empty("client_id", &request.client_id)?;
    require_non_empty("session_id", &request.session_id)?;
    require_non_empty("session_summary", &request.session_summary)?;

    for (i, delta) in request.role_deltas.iter().enumerate() {
        Role::normalize(&delta.role).map_err(|_| {
            BusinessError::new(
                ErrorCode::InvalidPushPayload,
                format!("role_deltas[{i}].role is not a recognized role"),
            )
        })?;
        if delta.memory_key.trim().is_empty() {
            return Err(BusinessError::new(
                ErrorCode::InvalidPushPayload,
                format!("role_deltas[{i}].memory_key must not be empty"),
            ));
        }
        if !(0.0..=1.0).contains(&delta.confidence) {
            return Err(BusinessError::new(
                ErrorCode::InvalidPushPayload,
                format!("role_deltas[{i}].confidence must be in [0, 1]"),
            ));
        }
    }

    for (i, decision) in request.decisions_delta.iter().enumerate() {
        if decision.title.trim().is_empty() {
            return Err(BusinessError::new(
                ErrorCode::InvalidPushPayload,
                format!("decisions_delta[{i}].title must not be empty"),
            ));
        }
    }

    for (i, new_loop) in request.open_loops_new.iter().enumerate() {
        if new_loop.title.trim().is_empty() {
            return Err(BusinessError::new(
                ErrorCode::InvalidPushPayload,
                format!("open_loops_new[{i}].title must not be empty"),
            ));
        }
    }

    for (i, closed) in request.open_loops_closed.iter().enumerate() {
        let has_reference = match closed {
            OpenLoopClosedInput::LoopId(id) => !id.trim().is_empty(),
            OpenLoopClosedInput::Object { loop_id, title } => {
                loop_id.as_deref().is_some_and(|s| !s.trim().is_empty())
                    || title.as_deref().is_some_and(|s| !s.trim().is_empty())
            }
        };
        if !has_reference {
            return Err(BusinessError::new(
                ErrorCode::InvalidPushPayload,
                format!("open_loops_closed[{i}] must name a loop_id or title"),
            ));
        }
    }

    for (i, file) in request.files_touched.iter().enumerate() {
        if file.trim().is_empty() {
            return Err(BusinessError::new(
                ErrorCode::InvalidPushPayload,
                format!("files_touched[{i}] must not be empty"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> PushRequest {
        PushRequest {
            project_id: "proj".to_string(),
            client_id: "client".to_string(),
            session_id: "sess".to_string(),
            context_stamp: None,
            session_summary: "did stuff".to_string(),
            role_deltas: vec![],
            decisions_delta: vec![],
            open_loops_new: vec![],
            open_loops_closed: vec![],
            files_touched: vec![],
            workspace_root: None,
        }
    }

    #[test]
    fn minimal_valid_request_passes() {
        assert!(validate_push_payload(&base_request()).is_ok());
    }

    #[test]
    fn blank_session_summary_is_rejected() {
        let mut req = base_request();
        req.session_summary = "   ".to_string();
        let err = validate_push_payload(&req).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::MissingRequiredFields);
    }

    #[test]
    fn role_delta_confidence_out_of_range_is_rejected() {
        use crate::sync::RoleDeltaInput;
        let mut req = base_request();
        req.role_deltas.push(RoleDeltaInput {
            role: "dev".to_string(),
            memory_key: "k".to_string(),
            value: serde_json::json!("v"),
            confidence: 1.5,
            source_refs: vec![],
        });
        let err = validate_push_payload(&req).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InvalidPushPayload);
    }

    #[test]
    fn unrecognized_role_is_rejected() {
        use crate::sync::RoleDeltaInput;
        let mut req = base_request();
        req.role_deltas.push(RoleDeltaInput {
            role: "ceo".to_string(),
            memory_key: "k".to_string(),
            value: serde_json::json!("v"),
            confidence: 0.5,
            source_refs: vec![],
        });
        assert!(validate_push_payload(&req).is_err());
    }

    #[test]
    fn open_loop_closed_without_id_or_title_is_rejected() {
        let mut req = base_request();
        req.open_loops_closed.push(OpenLoopClosedInput::Object {
            loop_id: None,
            title: None,
        });
        assert!(validate_push_payload(&req).is_err());
    }
}
