//! Roles and task types that namespace role memory and drive policy.

use serde::{Deserialize, Serialize};

use crate::errors::{BusinessError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Pm,
    Architect,
    Dev,
    Qa,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Pm => "pm",
            Role::Architect => "architect",
            Role::Dev => "dev",
            Role::Qa => "qa",
        }
    }

    /// Parses a role string, case-insensitively and trimmed, matching the
    /// reference implementation's `normalize_role`.
    pub fn normalize(raw: &str) -> Result<Role, BusinessError> {
        match raw.trim().to_lowercase().as_str() {
            "pm" => Ok(Role::Pm),
            "architect" => Ok(Role::Architect),
            "dev" => Ok(Role::Dev),
            "qa" => Ok(Role::Qa),
            other => Err(BusinessError::new(
                ErrorCode::InvalidPushPayload,
                format!("invalid role: {other}"),
            )),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Planning,
    Design,
    Implement,
    Test,
    Review,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Planning => "planning",
            TaskType::Design => "design",
            TaskType::Implement => "implement",
            TaskType::Test => "test",
            TaskType::Review => "review",
        }
    }

    pub fn parse_explicit(raw: &str) -> Option<TaskType> {
        match raw.trim().to_lowercase().as_str() {
            "planning" => Some(TaskType::Planning),
            "design" => Some(TaskType::Design),
            "implement" => Some(TaskType::Implement),
            "test" => Some(TaskType::Test),
            "review" => Some(TaskType::Review),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_normalize_is_case_and_whitespace_insensitive() {
        assert_eq!(Role::normalize(" PM ").unwrap(), Role::Pm);
        assert_eq!(Role::normalize("Architect").unwrap(), Role::Architect);
    }

    #[test]
    fn role_normalize_rejects_unknown_role() {
        let err = Role::normalize("ceo").unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InvalidPushPayload);
    }

    #[test]
    fn task_type_auto_is_not_a_parsed_explicit_value() {
        assert!(TaskType::parse_explicit("auto").is_none());
        assert!(TaskType::parse_explicit("").is_none());
    }
}
