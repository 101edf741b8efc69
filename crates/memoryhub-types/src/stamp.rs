//! Context/consistency stamps.
//!
//! A `ContextStamp` is what a client sends back on its next `push` to assert
//! the memory version it last observed; a `ConsistencyStamp` is what every
//! pull/push returns, binding `memory_version` to the indexer's
//! `catalog_version` and the consistency state between them.

use serde::{Deserialize, Serialize};

use crate::errors::{BusinessError, ErrorCode};

/// The structured form `{memory_version: N}`, or the legacy string form
/// `"v<N>"` accepted for one upgrade cycle. `None` forces the write (no
/// conflict check).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContextStampInput {
    Structured { memory_version: i64 },
    Legacy(String),
}

/// Parses a raw JSON context-stamp value (already deserialized as
/// `serde_json::Value` at the request boundary) into a base `memory_version`,
/// or `None` when the caller passed `null`/omitted it (force write).
pub fn parse_context_stamp(
    raw: Option<&serde_json::Value>,
) -> Result<Option<i64>, BusinessError> {
    let Some(value) = raw else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }

    if let Some(s) = value.as_str() {
        return parse_legacy_stamp(s).map(Some);
    }

    if let Some(obj) = value.as_object() {
        let memory_version = obj.get("memory_version").and_then(|v| v.as_i64());
        return match memory_version {
            Some(v) if v >= 0 => Ok(Some(v)),
            _ => Err(BusinessError::new(
                ErrorCode::InvalidContextStamp,
                "context_stamp.memory_version must be a non-negative integer",
            )),
        };
    }

    Err(BusinessError::new(
        ErrorCode::InvalidContextStamp,
        "context_stamp must be an object or null",
    ))
}

fn parse_legacy_stamp(raw: &str) -> Result<i64, BusinessError> {
    let trimmed = raw.trim().to_lowercase();
    let Some(digits) = trimmed.strip_prefix('v') else {
        return Err(BusinessError::new(
            ErrorCode::InvalidContextStamp,
            "context_stamp must use format v<integer>",
        ));
    };
    let value: i64 = digits.parse().map_err(|_| {
        BusinessError::new(
            ErrorCode::InvalidContextStamp,
            "context_stamp must use format v<integer>",
        )
    })?;
    if value < 0 {
        return Err(BusinessError::new(
            ErrorCode::InvalidContextStamp,
            "context_stamp cannot be negative",
        ));
    }
    Ok(value)
}

pub fn make_context_stamp(version: i64) -> String {
    format!("v{version}")
}

/// Returned on every pull/push: the triple a client carries forward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyStamp {
    pub memory_version: i64,
    pub catalog_version: String,
    pub consistency: ConsistencyStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyStatus {
    Ok,
    Degraded,
    Unknown,
}

impl ConsistencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyStatus::Ok => "ok",
            ConsistencyStatus::Degraded => "degraded",
            ConsistencyStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ConsistencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_or_absent_stamp_forces_write() {
        assert!(parse_context_stamp(None).unwrap().is_none());
        assert!(parse_context_stamp(Some(&json!(null))).unwrap().is_none());
    }

    #[test]
    fn legacy_string_stamp_is_equivalent_to_structured() {
        let legacy = parse_context_stamp(Some(&json!("v3"))).unwrap();
        let structured = parse_context_stamp(Some(&json!({"memory_version": 3}))).unwrap();
        assert_eq!(legacy, structured);
        assert_eq!(legacy, Some(3));
    }

    #[test]
    fn legacy_stamp_is_case_insensitive_and_trims() {
        assert_eq!(parse_context_stamp(Some(&json!(" V7 "))).unwrap(), Some(7));
    }

    #[test]
    fn structured_stamp_rejects_negative_memory_version() {
        let err = parse_context_stamp(Some(&json!({"memory_version": -1}))).unwrap_err();
        assert_eq!(err.error_code, crate::errors::ErrorCode::InvalidContextStamp);
    }

    #[test]
    fn zero_memory_version_is_valid() {
        assert_eq!(
            parse_context_stamp(Some(&json!({"memory_version": 0}))).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn malformed_legacy_string_is_rejected() {
        assert!(parse_context_stamp(Some(&json!("vabc"))).is_err());
        assert!(parse_context_stamp(Some(&json!("3"))).is_err());
    }

    #[test]
    fn make_context_stamp_matches_legacy_format() {
        assert_eq!(make_context_stamp(5), "v5");
    }
}
