//! # memory-hub
//!
//! A local-first, multi-project "agent memory" service: a per-session
//! `pull`/`push`/`resolve_conflict` cycle backed by SQLite, a lease-based
//! catalog refresh queue, drift detection against the workspace, and a
//! consistency stamp tying memory state to the catalog that was current
//! when it was written.
//!
//! This crate only wires together the engine crates beneath it —
//! `memoryhub-sync` for the operations themselves, `memoryhub-config` for
//! `.memoryhub.toml` loading, `memoryhub-types` for the request/response
//! vocabulary. The JSON-RPC transport that would carry these calls over
//! stdio, CLI wrappers, and backup/export tooling are deliberately not part
//! of this workspace; an embedder wires its own transport against the
//! functions below.
//!
//! ## Modules
//!
//! - [`memoryhub_sync`] — `pull`, `push`, `resolve_conflict`, the catalog
//!   worker, and the catalog brief/health tools, re-exported here as free
//!   functions taking an [`Engine`].
//! - [`memoryhub_config`] — `.memoryhub.toml` loading and defaults.
//! - [`memoryhub_types`] — request/response payloads and `BusinessError`.
//!
//! ## Example
//!
//! ```ignore
//! use memory_hub::{open, init_tracing};
//! use memoryhub_types::PullRequest;
//!
//! init_tracing();
//! let engine = open("/var/lib/memory-hub", Default::default())?;
//! let response = memory_hub::pull(&engine, &PullRequest { /* ... */ })?;
//! ```

use std::path::Path;

use anyhow::Result;

pub use memoryhub_config::Config;
pub use memoryhub_sync::{BatchStats, Engine};
pub use memoryhub_types as types;

use memoryhub_types::{
    AuditListRequest, AuditListResponse, CatalogBriefRequest, CatalogBriefResponse,
    CatalogHealthRequest, CatalogHealthResponse, PullRequest, PullResponse, PushRequest,
    PushResponse, ResolveConflictRequest, ResolveConflictResponse,
};

/// Loads `<root>/.memoryhub.toml` (or defaults, if absent) and opens an
/// [`Engine`] over it. `root` is the directory that contains both the
/// config file and the `projects/` tree the store reads and writes.
pub fn open(root: impl AsRef<Path>, overrides: Config) -> Result<Engine> {
    let root = root.as_ref();
    let file_config = memoryhub_config::load_config(root)?;
    Ok(Engine::new(root, file_config.merge(&overrides)))
}

/// `session.sync.pull`.
pub fn pull(engine: &Engine, request: &PullRequest) -> Result<PullResponse> {
    memoryhub_sync::pull(engine, request)
}

/// `session.sync.push`.
pub fn push(engine: &Engine, request: &PushRequest) -> Result<PushResponse> {
    memoryhub_sync::push(engine, request)
}

/// `session.sync.resolve_conflict`.
pub fn resolve_conflict(
    engine: &Engine,
    request: &ResolveConflictRequest,
) -> Result<ResolveConflictResponse> {
    memoryhub_sync::resolve_conflict(engine, request)
}

/// `session.sync.audit.list`.
pub fn audit_list(engine: &Engine, request: &AuditListRequest) -> Result<AuditListResponse> {
    memoryhub_sync::audit_list(engine, request)
}

/// `catalog.brief.generate`.
pub fn catalog_brief_generate(
    engine: &Engine,
    request: &CatalogBriefRequest,
) -> Result<CatalogBriefResponse> {
    memoryhub_sync::catalog_brief_generate(engine, request)
}

/// `catalog.health.check`.
pub fn catalog_health(
    engine: &Engine,
    request: &CatalogHealthRequest,
) -> Result<CatalogHealthResponse> {
    memoryhub_sync::catalog_health(engine, request)
}

/// Runs up to one project's configured `batch_limit` worth of pending
/// catalog jobs. Transports that don't run a background worker loop can
/// call this opportunistically (e.g. before a `pull`); `catalog_brief`
/// already does so inline when it finds the catalog stale.
pub fn run_catalog_batch(engine: &Engine, project_id: &str) -> Result<BatchStats> {
    memoryhub_sync::run_catalog_batch(engine, project_id)
}

/// Installs a global `tracing` subscriber: `fmt` output filtered by
/// `RUST_LOG` (or `info` if unset). Embedding transports that already run
/// their own subscriber should not call this; `memory-hub` never installs
/// one implicitly.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .event_format(fmt::format())
        .try_init();
}
