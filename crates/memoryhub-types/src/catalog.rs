//! Request/response payloads for the `catalog.*` tool surface, plus the
//! row-level shapes shared between the indexer, the worker and the store.

use serde::{Deserialize, Serialize};

fn default_prompt() -> String {
    String::new()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogBriefRequest {
    pub project_id: String,
    #[serde(default)]
    pub workspace_root: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default = "default_prompt")]
    pub task_prompt: String,
    #[serde(default = "default_token_budget")]
    pub token_budget: i64,
}

fn default_token_budget() -> i64 {
    600
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogBriefResponse {
    pub catalog_version: String,
    pub catalog_brief: String,
    pub cache_hit: bool,
    pub freshness: CatalogFreshness,
    pub refresh_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogFreshness {
    Fresh,
    Stale,
    Unknown,
}

impl CatalogFreshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogFreshness::Fresh => "fresh",
            CatalogFreshness::Stale => "stale",
            CatalogFreshness::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CatalogFreshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogHealthRequest {
    pub project_id: String,
    #[serde(default)]
    pub workspace_root: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogHealthResponse {
    pub catalog_version: String,
    pub freshness: CatalogFreshness,
    pub total_files: i64,
    pub indexed_files: i64,
    pub coverage_pct: f64,
    pub coverage: String,
    pub pending_jobs: i64,
    pub running_jobs: i64,
    pub failed_jobs: i64,
    pub last_indexed_at: Option<String>,
    pub last_full_rebuild: bool,
    pub drift_score: f64,
    pub consistency_status: String,
    pub drift: DriftSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftSummary {
    pub drifted: bool,
    pub method: DriftMethod,
    pub changed_files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftMethod {
    GitDiff,
    HashCompare,
}

impl DriftMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftMethod::GitDiff => "git_diff",
            DriftMethod::HashCompare => "hash_compare",
        }
    }
}

impl std::fmt::Display for DriftMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `catalog_files`: a source file observed by the indexer.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogFile {
    pub path: String,
    pub language: String,
    pub content_hash: String,
    pub size_bytes: i64,
}

/// One row of `catalog_edges`: an import relationship extracted from a file.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEdge {
    pub from_path: String,
    pub to_module: String,
    pub confidence: f64,
    pub source_type: ImportSourceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSourceType {
    Ast,
    Inferred,
}

impl ImportSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportSourceType::Ast => "ast",
            ImportSourceType::Inferred => "inferred",
        }
    }
}

impl std::fmt::Display for ImportSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full scan result before it is persisted and diffed against the prior
/// `catalog_meta` row.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub catalog_version: String,
    pub files: Vec<CatalogFile>,
    pub edges: Vec<CatalogEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogJobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl CatalogJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogJobStatus::Pending => "pending",
            CatalogJobStatus::Running => "running",
            CatalogJobStatus::Done => "done",
            CatalogJobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CatalogJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
