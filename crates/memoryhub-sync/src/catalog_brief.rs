//! `catalog.brief.generate`, `catalog.health.check`, and the internal
//! `catalog_brief_for_pull` hook `pull` uses to fold a catalog summary into
//! its context brief.
//!
//! Health and the brief share one code path (`generate`/`compute_health`) so
//! a `pull` and a direct `catalog.brief.generate` call see the same
//! freshness determination for the same underlying rows.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use memoryhub_store::Store;
use memoryhub_types::{
    CatalogBriefRequest, CatalogBriefResponse, CatalogEdge, CatalogFile, CatalogFreshness,
    CatalogHealthRequest, CatalogHealthResponse, DriftMethod, DriftSummary, PullRequest, TaskType,
};
use memoryhub_policy::truncate_with_suffix;
use sha2::{Digest, Sha256};

use crate::Engine;

const TOP_FILES: usize = 8;
const TOP_EDGES: usize = 16;
const EDGE_CONFIDENCE_FLOOR: f64 = 0.5;
const MAX_PROMPT_TERMS: usize = 20;

/// `catalog_brief_for_pull`'s result: the rendered brief plus whether *this*
/// read, not the cached copy, found the catalog fresh — `pull` needs the
/// latter for `consistency_stamp.consistency`.
pub struct PullCatalogOutcome {
    pub brief: CatalogBriefResponse,
    pub fresh: bool,
}

pub fn catalog_brief_for_pull(
    engine: &Engine,
    store: &mut Store,
    project_id: &str,
    pull_request: &PullRequest,
    task_type: TaskType,
) -> Result<PullCatalogOutcome> {
    let request = CatalogBriefRequest {
        project_id: project_id.to_string(),
        workspace_root: None,
        task_type: Some(task_type.as_str().to_string()),
        task_prompt: pull_request.task_prompt.clone(),
        token_budget: engine.config.policy.default_catalog_token_budget,
    };
    let brief = generate(engine, store, &request)?;
    let fresh = brief.freshness == CatalogFreshness::Fresh;
    Ok(PullCatalogOutcome { brief, fresh })
}

pub fn catalog_brief_generate(
    engine: &Engine,
    request: &CatalogBriefRequest,
) -> Result<CatalogBriefResponse> {
    let mut store = Store::connect(&engine.root, &request.project_id, engine.busy_timeout_ms())?;
    generate(engine, &mut store, request)
}

pub fn catalog_health(
    engine: &Engine,
    request: &CatalogHealthRequest,
) -> Result<CatalogHealthResponse> {
    let store = Store::connect(&engine.root, &request.project_id, engine.busy_timeout_ms())?;
    compute_health(engine, &store, request.workspace_root.as_deref())
}

fn generate(
    engine: &Engine,
    store: &mut Store,
    request: &CatalogBriefRequest,
) -> Result<CatalogBriefResponse> {
    let workspace_root =
        resolve_workspace_root(engine, store.conn(), request.workspace_root.as_deref());

    if memoryhub_store::all_catalog_files(store.conn())?.is_empty() {
        build_full_snapshot(engine, store, &workspace_root)?;
    }

    let mut health = compute_health(engine, store, request.workspace_root.as_deref())?;
    if matches!(health.freshness, CatalogFreshness::Stale | CatalogFreshness::Unknown) {
        let _ = crate::catalog_worker::run_batch(
            engine,
            &request.project_id,
            engine.config.catalog.inline_job_limit,
        );
        health = compute_health(engine, store, request.workspace_root.as_deref())?;
    }

    let task_type = request
        .task_type
        .as_deref()
        .and_then(TaskType::parse_explicit)
        .unwrap_or(TaskType::Planning);
    let token_budget = if request.token_budget > 0 {
        request.token_budget
    } else {
        engine.config.policy.default_catalog_token_budget
    };

    let cache_key = cache_key_for(
        &request.project_id,
        task_type,
        token_budget,
        &health.catalog_version,
        &request.task_prompt,
    );

    if health.freshness == CatalogFreshness::Fresh {
        if let Some(mut cached) = engine.cache.lock().unwrap().get(&cache_key) {
            cached.cache_hit = true;
            return Ok(cached);
        }
    }

    let (files, edges) = memoryhub_store::catalog_files_and_edges(store.conn())?;
    let brief_text = render_brief(
        task_type,
        &health.catalog_version,
        &request.task_prompt,
        &files,
        &edges,
        token_budget,
    );

    let mut refresh_requested = false;
    if matches!(health.freshness, CatalogFreshness::Stale | CatalogFreshness::Unknown)
        && health.pending_jobs == 0
    {
        let tx = store.begin_immediate()?;
        memoryhub_store::enqueue_catalog_job(
            &tx,
            "incremental_refresh",
            &serde_json::json!({
                "reason": "pull_stale_refresh",
                "workspace_root": workspace_root.to_string_lossy(),
            }),
            engine.config.store.max_job_attempts,
        )?;
        tx.commit()?;
        refresh_requested = true;
    }

    let response = CatalogBriefResponse {
        catalog_version: health.catalog_version.clone(),
        catalog_brief: brief_text,
        cache_hit: false,
        freshness: health.freshness,
        refresh_requested,
    };

    if health.freshness == CatalogFreshness::Fresh {
        engine.cache.lock().unwrap().put(cache_key, response.clone());
    }

    Ok(response)
}

fn resolve_workspace_root(
    engine: &Engine,
    conn: &rusqlite::Connection,
    requested: Option<&str>,
) -> PathBuf {
    if let Some(root) = requested {
        return PathBuf::from(root);
    }
    memoryhub_store::project_meta(conn)
        .ok()
        .and_then(|meta| meta.workspace_root)
        .map(PathBuf::from)
        .unwrap_or_else(|| engine.root.clone())
}

fn build_full_snapshot(engine: &Engine, store: &mut Store, workspace_root: &Path) -> Result<()> {
    let scan = memoryhub_catalog::build_snapshot(
        workspace_root,
        engine.config.catalog.max_file_size_bytes,
        None,
    )?;
    let tx = store.begin_immediate()?;
    memoryhub_store::replace_catalog_snapshot(&tx, &scan.snapshot, scan.total_files, true)?;
    tx.commit()?;
    Ok(())
}

fn compute_health(
    engine: &Engine,
    store: &Store,
    workspace_root_hint: Option<&str>,
) -> Result<CatalogHealthResponse> {
    let conn = store.conn();
    let health_row = memoryhub_store::catalog_health_row(conn)?;
    let known_files = memoryhub_store::all_catalog_files(conn)?;

    if !known_files.is_empty() {
        let workspace_root = resolve_workspace_root(engine, conn, workspace_root_hint);
        let drift = memoryhub_drift::detect_drift(&workspace_root, &known_files);
        memoryhub_store::insert_drift_report(
            conn,
            drift.method,
            drift.drift_score,
            &drift.changed_files,
            drift.total_files as i64,
        )?;
    }

    let drift_report = memoryhub_store::latest_drift_report(conn)?;
    let consistency = memoryhub_store::latest_consistency_link(conn)?;

    let never_indexed = health_row.catalog_version.is_none();
    let drift_score = drift_report.as_ref().map(|d| d.drift_score).unwrap_or(0.0);

    let freshness = if never_indexed {
        CatalogFreshness::Unknown
    } else if health_row.pending_jobs > 0 || health_row.running_jobs > 0 || drift_score > 0.0 {
        CatalogFreshness::Stale
    } else {
        CatalogFreshness::Fresh
    };

    let coverage_pct = if health_row.total_files > 0 {
        health_row.indexed_files as f64 / health_row.total_files as f64 * 100.0
    } else {
        0.0
    };

    let consistency_status = consistency
        .map(|c| c.consistency_status.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    Ok(CatalogHealthResponse {
        catalog_version: health_row.catalog_version.clone().unwrap_or_default(),
        freshness,
        total_files: health_row.total_files,
        indexed_files: health_row.indexed_files,
        coverage_pct,
        coverage: format!("{}/{}", health_row.indexed_files, health_row.total_files),
        pending_jobs: health_row.pending_jobs,
        running_jobs: health_row.running_jobs,
        failed_jobs: health_row.failed_jobs,
        last_indexed_at: health_row.last_indexed_at,
        last_full_rebuild: health_row.last_full_rebuild,
        drift_score,
        consistency_status,
        drift: DriftSummary {
            drifted: drift_score > 0.0,
            method: drift_report.as_ref().map(|d| d.method).unwrap_or(DriftMethod::HashCompare),
            changed_files: drift_report.map(|d| d.changed_files).unwrap_or_default(),
        },
    })
}

fn cache_key_for(
    project_id: &str,
    task_type: TaskType,
    token_budget: i64,
    catalog_version: &str,
    prompt: &str,
) -> String {
    let normalized_prompt = prompt.trim().to_lowercase();
    let prompt_hash = format!("{:x}", Sha256::digest(normalized_prompt.as_bytes()));
    format!("{project_id}:{}:{token_budget}:{catalog_version}:{prompt_hash}", task_type.as_str())
}

static PROMPT_TERM_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"[A-Za-z0-9_./-]+|[\u{4e00}-\u{9fff}]{2,}").unwrap()
});

/// Lower-cased prompt tokens matching `[A-Za-z0-9_./-]+` or 2+ consecutive
/// CJK ideographs, length >= 2 chars, capped at [`MAX_PROMPT_TERMS`].
fn prompt_terms(prompt: &str) -> Vec<String> {
    let lower = prompt.to_lowercase();
    PROMPT_TERM_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= 2)
        .take(MAX_PROMPT_TERMS)
        .collect()
}

fn score_files(
    task_type: TaskType,
    prompt: &str,
    files: &[CatalogFile],
    edges: &[CatalogEdge],
) -> Vec<(f64, i64, String)> {
    let terms = prompt_terms(prompt);
    let import_counts: std::collections::HashMap<&str, i64> = files
        .iter()
        .map(|f| {
            let count = edges.iter().filter(|e| e.from_path == f.path).count() as i64;
            (f.path.as_str(), count)
        })
        .collect();

    files
        .iter()
        .map(|file| {
            let import_count = *import_counts.get(file.path.as_str()).unwrap_or(&0);
            let lower_path = file.path.to_lowercase();
            let mut score = 0.05 * import_count as f64;

            for term in &terms {
                if lower_path.contains(term.as_str()) {
                    score += 3.0;
                }
            }
            if matches!(task_type, TaskType::Test | TaskType::Review)
                && (lower_path.contains("test") || lower_path.contains("spec"))
            {
                score += 2.0;
            }
            if task_type == TaskType::Implement
                && (lower_path.contains("src/") || lower_path.contains("lib/"))
            {
                score += 1.0;
            }
            for edge in edges.iter().filter(|e| e.from_path == file.path) {
                let lower_module = edge.to_module.to_lowercase();
                if terms.iter().any(|term| lower_module.contains(term.as_str())) {
                    score += 1.5;
                }
            }

            (score, import_count, file.path.clone())
        })
        .collect()
}

fn render_brief(
    task_type: TaskType,
    catalog_version: &str,
    prompt: &str,
    files: &[CatalogFile],
    edges: &[CatalogEdge],
    token_budget: i64,
) -> String {
    let mut scored = score_files(task_type, prompt, files, edges);
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.cmp(&a.1))
            .then(a.2.cmp(&b.2))
    });
    let top_files: Vec<&CatalogFile> = scored
        .iter()
        .take(TOP_FILES)
        .filter_map(|(_, _, path)| files.iter().find(|f| &f.path == path))
        .collect();

    let top_paths: BTreeSet<&str> = top_files.iter().map(|f| f.path.as_str()).collect();
    let mut top_edges: Vec<&CatalogEdge> = edges
        .iter()
        .filter(|e| top_paths.contains(e.from_path.as_str()) && e.confidence >= EDGE_CONFIDENCE_FLOOR)
        .collect();
    top_edges.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.from_path.cmp(&b.from_path))
    });
    top_edges.truncate(TOP_EDGES);

    let mut out = String::new();
    out.push_str("[Catalog Brief]\n");
    out.push_str(&format!("TaskType: {}\n", task_type.as_str()));
    out.push_str(&format!("CatalogVersion: {catalog_version}\n"));

    out.push_str("Top Files:\n");
    if top_files.is_empty() {
        out.push_str("- (no indexed files)\n");
    } else {
        for file in &top_files {
            let import_count = edges.iter().filter(|e| e.from_path == file.path).count();
            out.push_str(&format!(
                "- {} (lang={}, imports={})\n",
                file.path, file.language, import_count
            ));
        }
    }

    out.push_str("Key Dependencies (confidence >= 0.5):\n");
    if top_edges.is_empty() {
        out.push_str("- (no dependencies)\n");
    } else {
        for edge in &top_edges {
            out.push_str(&format!(
                "- {} -> {} (confidence={:.2}, source={})\n",
                edge.from_path, edge.to_module, edge.confidence, edge.source_type
            ));
        }
    }

    let budget = (token_budget * 4).max(300) as usize;
    truncate_with_suffix(out.trim_end_matches('\n'), budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoryhub_config::Config;
    use memoryhub_types::ImportSourceType;

    fn engine_for(root: &std::path::Path) -> Engine {
        Engine::new(root.to_path_buf(), Config::default())
    }

    #[test]
    fn first_use_builds_a_snapshot_and_reports_unknown_turned_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), b"import os\n").unwrap();
        let engine = engine_for(dir.path());

        let request = CatalogBriefRequest {
            project_id: "p1".to_string(),
            workspace_root: Some(dir.path().to_string_lossy().to_string()),
            task_type: Some("implement".to_string()),
            task_prompt: "implement the main module".to_string(),
            token_budget: 600,
        };
        let response = catalog_brief_generate(&engine, &request).unwrap();
        assert!(response.catalog_brief.contains("[Catalog Brief]"));
        assert!(response.catalog_brief.contains("main.py"));
    }

    #[test]
    fn health_on_an_empty_project_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());
        let health = catalog_health(
            &engine,
            &CatalogHealthRequest {
                project_id: "p1".to_string(),
                workspace_root: None,
            },
        )
        .unwrap();
        assert_eq!(health.freshness, CatalogFreshness::Unknown);
        assert_eq!(health.coverage_pct, 0.0);
    }

    #[test]
    fn prompt_terms_are_lowercased_deduped_by_substring_and_capped() {
        let terms = prompt_terms("Implement the Auth Module in src/auth.py");
        assert!(terms.contains(&"auth".to_string()));
        assert!(terms.iter().all(|t| t.len() >= 2));
    }

    #[test]
    fn prompt_terms_matches_runs_of_two_or_more_cjk_ideographs() {
        let terms = prompt_terms("请帮我做架构设计");
        assert!(terms.contains(&"架构".to_string()));
        assert!(terms.contains(&"设计".to_string()));
    }

    #[test]
    fn scoring_matches_cjk_prompt_terms_against_file_paths() {
        let files = vec![CatalogFile {
            path: "架构/设计.py".to_string(),
            language: "python".to_string(),
            content_hash: "h1".to_string(),
            size_bytes: 10,
        }];
        let scored = score_files(TaskType::Design, "请帮我做架构设计", &files, &[]);
        assert!(scored[0].0 > 0.0);
    }

    #[test]
    fn scoring_prefers_path_matches_and_import_heavy_files() {
        let files = vec![
            CatalogFile {
                path: "src/auth.py".to_string(),
                language: "python".to_string(),
                content_hash: "h1".to_string(),
                size_bytes: 10,
            },
            CatalogFile {
                path: "src/unrelated.py".to_string(),
                language: "python".to_string(),
                content_hash: "h2".to_string(),
                size_bytes: 10,
            },
        ];
        let edges = vec![CatalogEdge {
            from_path: "src/auth.py".to_string(),
            to_module: "os".to_string(),
            confidence: 1.0,
            source_type: ImportSourceType::Ast,
        }];
        let scored = score_files(TaskType::Implement, "fix the auth bug", &files, &edges);
        let auth_score = scored.iter().find(|(_, _, p)| p == "src/auth.py").unwrap().0;
        let other_score = scored
            .iter()
            .find(|(_, _, p)| p == "src/unrelated.py")
            .unwrap()
            .0;
        assert!(auth_score > other_score);
    }
}
