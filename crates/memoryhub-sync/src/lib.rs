//! The session-sync engine: `pull`, `push`, `resolve_conflict`, the catalog
//! worker, and the catalog brief/health tools, wired together behind one
//! [`Engine`] handle per on-disk root.
//!
//! Every operation opens and closes its own [`memoryhub_store::Store`]
//! connection; the only state an `Engine` carries across calls is its
//! configuration and the catalog-brief LRU cache.

mod audit_list;
mod cache;
mod catalog_brief;
mod catalog_worker;
mod pull;
mod push;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use memoryhub_config::Config;
use memoryhub_types::{
    AuditListRequest, AuditListResponse, CatalogBriefRequest, CatalogBriefResponse,
    CatalogHealthRequest, CatalogHealthResponse, PullRequest, PullResponse, PushRequest,
    PushResponse, ResolveConflictRequest, ResolveConflictResponse,
};

pub use catalog_worker::BatchStats;
use cache::BriefCache;

/// A handle to one memory-hub root directory (the parent of `projects/`).
/// Cheap to construct per request; expensive-to-rebuild state (the brief
/// cache) lives here so it survives across calls from the same process.
pub struct Engine {
    root: PathBuf,
    config: Config,
    cache: Mutex<BriefCache>,
}

impl Engine {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        let cache = BriefCache::new(config.catalog.cache_capacity, config.catalog.cache_ttl);
        Self {
            root: root.into(),
            config,
            cache: Mutex::new(cache),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn busy_timeout_ms(&self) -> u32 {
        self.config.store.busy_timeout.as_millis() as u32
    }
}

pub fn pull(engine: &Engine, request: &PullRequest) -> anyhow::Result<PullResponse> {
    pull::pull(engine, request)
}

pub fn push(engine: &Engine, request: &PushRequest) -> anyhow::Result<PushResponse> {
    push::push(engine, request)
}

pub fn resolve_conflict(
    engine: &Engine,
    request: &ResolveConflictRequest,
) -> anyhow::Result<ResolveConflictResponse> {
    push::resolve_conflict(engine, request)
}

pub fn run_catalog_batch(engine: &Engine, project_id: &str) -> anyhow::Result<BatchStats> {
    catalog_worker::run_batch(engine, project_id, engine.config.catalog.batch_limit)
}

pub fn catalog_brief_generate(
    engine: &Engine,
    request: &CatalogBriefRequest,
) -> anyhow::Result<CatalogBriefResponse> {
    catalog_brief::catalog_brief_generate(engine, request)
}

pub fn catalog_health(
    engine: &Engine,
    request: &CatalogHealthRequest,
) -> anyhow::Result<CatalogHealthResponse> {
    catalog_brief::catalog_health(engine, request)
}

pub fn audit_list(engine: &Engine, request: &AuditListRequest) -> anyhow::Result<AuditListResponse> {
    audit_list::audit_list(engine, request)
}
