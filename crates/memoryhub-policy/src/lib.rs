//! Task classification, role selection, and the `[Context Brief]` renderer.
//!
//! Nothing here touches SQLite directly; callers (`memoryhub-sync`) hand in
//! already-queried rows and get back a `Role` selection or a rendered text
//! block. Section headers and bullet formats below are exact — tests in
//! `memoryhub-sync` string-match them.

use memoryhub_store::{HandoffPacketRow, OpenLoopRow, RolePayloadRow};
use memoryhub_types::{Role, TaskType};

/// Suffix appended whenever a rendered brief is truncated to fit its byte
/// budget. Shared with `memoryhub-sync`'s catalog-brief renderer so both
/// halves of a `context_brief` truncate identically.
pub const TRUNCATION_SUFFIX: &str = "\n... (truncated)";

/// Substring keyword buckets, checked in this fixed order; the first bucket
/// with a hit in the lower-cased prompt wins. No hit falls back to
/// `TaskType::Planning`. Ported verbatim (including the CJK terms) from
/// `_TASK_KEYWORDS`.
const KEYWORD_BUCKETS: &[(TaskType, &[&str])] = &[
    (
        TaskType::Planning,
        &[
            "plan", "planning", "roadmap", "milestone", "scope", "requirement", "需求", "规划",
            "里程碑",
        ],
    ),
    (
        TaskType::Design,
        &[
            "design",
            "architecture",
            "schema",
            "interface",
            "api design",
            "架构",
            "设计",
            "方案",
            "接口",
        ],
    ),
    (
        TaskType::Implement,
        &[
            "implement",
            "implementation",
            "code",
            "coding",
            "fix",
            "bugfix",
            "refactor",
            "write",
            "实现",
            "开发",
            "修复",
            "重构",
            "写代码",
        ],
    ),
    (
        TaskType::Test,
        &[
            "test", "testing", "qa", "regression", "coverage", "验证", "测试", "回归",
        ],
    ),
    (
        TaskType::Review,
        &["review", "code review", "审查", "评审", "检查"],
    ),
];

/// Honors an explicit, parseable `task_type` as-is; otherwise (absent,
/// `"auto"`, or unrecognized) substring-matches the lower-cased prompt
/// against [`KEYWORD_BUCKETS`] in order, defaulting to `Planning`.
pub fn classify_task_type(explicit: Option<&str>, prompt: &str) -> TaskType {
    if let Some(raw) = explicit {
        if let Some(parsed) = TaskType::parse_explicit(raw) {
            return parsed;
        }
    }

    let lower = prompt.to_lowercase();
    for (task_type, keywords) in KEYWORD_BUCKETS {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return *task_type;
        }
    }
    TaskType::Planning
}

/// Fixed role-selection table. `auto`/unmatched prompts resolve to
/// `Planning` upstream, so this table does not need its own `auto` arm.
pub fn select_roles(task_type: TaskType) -> Vec<Role> {
    match task_type {
        TaskType::Planning => vec![Role::Pm, Role::Architect],
        TaskType::Design => vec![Role::Architect, Role::Pm],
        TaskType::Implement => vec![Role::Architect, Role::Dev],
        TaskType::Test | TaskType::Review => vec![Role::Qa, Role::Dev, Role::Architect],
    }
}

/// One role's slice of recent memory, already queried by the caller.
pub struct RoleBriefSection {
    pub role: Role,
    pub items: Vec<RolePayloadRow>,
}

/// Renders the `memory_context_brief` half of a pull response. Each section
/// header (`Roles:`, `Open Loops (Top):`, `Latest Handoff:`) is omitted
/// entirely when its section has no data — an empty `roles` slice means no
/// `Roles:` header, not a header followed by nothing.
///
/// ```text
/// [Context Brief]
/// Roles:
/// - pm:
///   - goal: Build sync
/// - architect:
///   (no items)
/// Open Loops (Top):
/// - [1] Wire the transport (loop_abc123)
/// Latest Handoff:
/// - seed session
/// ```
pub fn build_context_brief(
    roles: &[RoleBriefSection],
    open_loops: &[OpenLoopRow],
    handoff: Option<&HandoffPacketRow>,
    max_tokens: i64,
) -> String {
    let mut out = String::new();
    out.push_str("[Context Brief]\n");

    if !roles.is_empty() {
        out.push_str("Roles:\n");
        for section in roles {
            out.push_str(&format!("- {}:\n", section.role));
            if section.items.is_empty() {
                out.push_str("  (no items)\n");
                continue;
            }
            for item in section.items.iter().take(6) {
                out.push_str(&format!(
                    "  - {}: {}\n",
                    item.memory_key,
                    render_value(&item.value)
                ));
            }
        }
    }

    if !open_loops.is_empty() {
        out.push_str("Open Loops (Top):\n");
        for loop_row in open_loops.iter().take(3) {
            out.push_str(&format!(
                "- [{}] {} ({})\n",
                loop_row.priority, loop_row.title, loop_row.loop_id
            ));
        }
    }

    if let Some(packet) = handoff {
        out.push_str("Latest Handoff:\n");
        out.push_str(&format!("- {}\n", summarize_handoff(packet)));
    }

    let budget = (max_tokens.max(0) as usize * 4).max(400);
    truncate_with_suffix(out.trim_end_matches('\n'), budget)
}

/// Renders a `role_state_current.value` JSON blob compactly: a bare string
/// renders unquoted, anything else renders as compact JSON.
fn render_value(value: &serde_json::Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()),
    }
}

fn summarize_handoff(packet: &HandoffPacketRow) -> String {
    packet
        .summary
        .get("session_summary")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| render_value(&packet.summary))
}

/// Truncates `s` to at most `max_bytes` total bytes (suffix included),
/// cutting on a UTF-8 char boundary. A no-op when `s` already fits.
pub fn truncate_with_suffix(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let budget = max_bytes.saturating_sub(TRUNCATION_SUFFIX.len());
    let mut end = budget.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_task_type_is_honored() {
        assert_eq!(
            classify_task_type(Some("implement"), "please plan the roadmap"),
            TaskType::Implement
        );
    }

    #[test]
    fn auto_falls_back_to_keyword_match_in_fixed_order() {
        assert_eq!(classify_task_type(Some("auto"), "let's design the api"), TaskType::Design);
        assert_eq!(classify_task_type(None, "run the test suite"), TaskType::Test);
    }

    #[test]
    fn unmatched_prompt_defaults_to_planning() {
        assert_eq!(classify_task_type(None, "hello there"), TaskType::Planning);
    }

    #[test]
    fn role_selection_matches_fixed_table() {
        assert_eq!(select_roles(TaskType::Planning), vec![Role::Pm, Role::Architect]);
        assert_eq!(select_roles(TaskType::Design), vec![Role::Architect, Role::Pm]);
        assert_eq!(select_roles(TaskType::Implement), vec![Role::Architect, Role::Dev]);
        assert_eq!(
            select_roles(TaskType::Test),
            vec![Role::Qa, Role::Dev, Role::Architect]
        );
        assert_eq!(
            select_roles(TaskType::Review),
            vec![Role::Qa, Role::Dev, Role::Architect]
        );
    }

    #[test]
    fn context_brief_renders_exact_section_headers_when_present() {
        let brief = build_context_brief(
            &[RoleBriefSection {
                role: Role::Pm,
                items: vec![],
            }],
            &[],
            None,
            1200,
        );
        assert!(brief.starts_with("[Context Brief]\n"));
        assert!(brief.contains("Roles:\n- pm:\n  (no items)\n"));
        assert!(!brief.contains("Open Loops (Top):"));
        assert!(!brief.contains("Latest Handoff:"));
    }

    #[test]
    fn context_brief_omits_every_header_when_all_sections_are_empty() {
        let brief = build_context_brief(&[], &[], None, 1200);
        assert_eq!(brief, "[Context Brief]");
    }

    #[test]
    fn context_brief_lists_up_to_six_items_per_role() {
        let items: Vec<RolePayloadRow> = (0..8)
            .map(|i| RolePayloadRow {
                memory_key: format!("k{i}"),
                value: json!(format!("v{i}")),
                confidence: 0.5,
                version: 1,
                updated_at: "now".to_string(),
                updated_by_client: "c1".to_string(),
                source_refs: json!([]),
            })
            .collect();
        let brief = build_context_brief(
            &[RoleBriefSection {
                role: Role::Architect,
                items,
            }],
            &[],
            None,
            1200,
        );
        assert_eq!(brief.matches("- k").count(), 6);
    }

    #[test]
    fn truncation_bounds_total_length_and_appends_suffix() {
        let long = "x".repeat(1000);
        let truncated = truncate_with_suffix(&long, 400);
        assert!(truncated.len() <= 400);
        assert!(truncated.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn truncation_is_a_no_op_when_already_within_budget() {
        assert_eq!(truncate_with_suffix("short", 400), "short");
    }
}
