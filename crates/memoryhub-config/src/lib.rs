//! Layered `.memoryhub.toml` configuration.
//!
//! Mirrors this workspace's existing `shipper-config`: a `Config` struct with
//! `#[serde(default)]` sub-sections, a `load_config` that reads an optional
//! file from a directory, and a `merge` that lets CLI/environment overrides
//! win over file defaults without the caller needing to know which fields
//! were actually set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default configuration file name, read from the store root's parent
/// directory (the directory that contains `projects/`).
pub const CONFIG_FILE: &str = ".memoryhub.toml";

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            catalog: CatalogConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory under which `projects/<project_id>/memory.db` live.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// `sqlite3_busy_timeout`, applied to every connection.
    #[serde(default = "default_busy_timeout", with = "humantime_serde")]
    pub busy_timeout: Duration,
    /// Lease window granted to a catalog worker on `claim_next_catalog_job`.
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: i64,
    /// `max_attempts` before a catalog job is marked `failed`.
    #[serde(default = "default_max_job_attempts")]
    pub max_job_attempts: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            busy_timeout: default_busy_timeout(),
            lease_seconds: default_lease_seconds(),
            max_job_attempts: default_max_job_attempts(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".memoryhub")
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_lease_seconds() -> i64 {
    120
}

fn default_max_job_attempts() -> i64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Batch size for one `catalog_worker::run_batch` invocation.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Inline-worker jobs run by `catalog_brief` when the catalog is stale.
    #[serde(default = "default_inline_job_limit")]
    pub inline_job_limit: usize,
    /// Brief LRU cache capacity.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Brief LRU cache entry TTL.
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Maximum tracked file size for the indexer.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            inline_job_limit: default_inline_job_limit(),
            cache_capacity: default_cache_capacity(),
            cache_ttl: default_cache_ttl(),
            max_file_size_bytes: default_max_file_size(),
        }
    }
}

fn default_batch_limit() -> usize {
    20
}

fn default_inline_job_limit() -> usize {
    5
}

fn default_cache_capacity() -> usize {
    256
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_max_file_size() -> u64 {
    1_000_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Default `max_tokens` for `pull` when the caller omits it.
    #[serde(default = "default_pull_max_tokens")]
    pub default_pull_max_tokens: i64,
    /// Default `token_budget` for `catalog.brief.generate`.
    #[serde(default = "default_catalog_token_budget")]
    pub default_catalog_token_budget: i64,
    /// `HandoffPacket` TTL.
    #[serde(default = "default_handoff_ttl", with = "humantime_serde")]
    pub handoff_ttl: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_pull_max_tokens: default_pull_max_tokens(),
            default_catalog_token_budget: default_catalog_token_budget(),
            handoff_ttl: default_handoff_ttl(),
        }
    }
}

fn default_pull_max_tokens() -> i64 {
    1200
}

fn default_catalog_token_budget() -> i64 {
    600
}

fn default_handoff_ttl() -> Duration {
    Duration::from_secs(72 * 60 * 60)
}

impl PolicyConfig {
    /// `handoff_ttl` converted for use against `chrono::Utc::now()`.
    pub fn handoff_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.handoff_ttl).unwrap_or_else(|_| chrono::Duration::hours(72))
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `other` over `self`, field by field, with `other`'s
    /// non-default values winning. Mirrors `shipper_config::Config::merge`.
    pub fn merge(&self, other: &Config) -> Config {
        Config {
            store: StoreConfig {
                root: if other.store.root != default_root() {
                    other.store.root.clone()
                } else {
                    self.store.root.clone()
                },
                busy_timeout: if other.store.busy_timeout != default_busy_timeout() {
                    other.store.busy_timeout
                } else {
                    self.store.busy_timeout
                },
                lease_seconds: if other.store.lease_seconds != default_lease_seconds() {
                    other.store.lease_seconds
                } else {
                    self.store.lease_seconds
                },
                max_job_attempts: if other.store.max_job_attempts != default_max_job_attempts() {
                    other.store.max_job_attempts
                } else {
                    self.store.max_job_attempts
                },
            },
            catalog: CatalogConfig {
                batch_limit: if other.catalog.batch_limit != default_batch_limit() {
                    other.catalog.batch_limit
                } else {
                    self.catalog.batch_limit
                },
                inline_job_limit: if other.catalog.inline_job_limit != default_inline_job_limit() {
                    other.catalog.inline_job_limit
                } else {
                    self.catalog.inline_job_limit
                },
                cache_capacity: if other.catalog.cache_capacity != default_cache_capacity() {
                    other.catalog.cache_capacity
                } else {
                    self.catalog.cache_capacity
                },
                cache_ttl: if other.catalog.cache_ttl != default_cache_ttl() {
                    other.catalog.cache_ttl
                } else {
                    self.catalog.cache_ttl
                },
                max_file_size_bytes: if other.catalog.max_file_size_bytes != default_max_file_size()
                {
                    other.catalog.max_file_size_bytes
                } else {
                    self.catalog.max_file_size_bytes
                },
            },
            policy: PolicyConfig {
                default_pull_max_tokens: if other.policy.default_pull_max_tokens
                    != default_pull_max_tokens()
                {
                    other.policy.default_pull_max_tokens
                } else {
                    self.policy.default_pull_max_tokens
                },
                default_catalog_token_budget: if other.policy.default_catalog_token_budget
                    != default_catalog_token_budget()
                {
                    other.policy.default_catalog_token_budget
                } else {
                    self.policy.default_catalog_token_budget
                },
                handoff_ttl: if other.policy.handoff_ttl != default_handoff_ttl() {
                    other.policy.handoff_ttl
                } else {
                    self.policy.handoff_ttl
                },
            },
        }
    }
}

/// Loads `<dir>/.memoryhub.toml` if present, else returns defaults. A
/// present-but-unparseable file is an error; an absent file is not.
pub fn load_config(dir: &Path) -> Result<Config> {
    let path = config_path(dir);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let cfg = Config::default();
        assert_eq!(cfg.store.lease_seconds, 120);
        assert_eq!(cfg.catalog.batch_limit, 20);
        assert_eq!(cfg.policy.default_pull_max_tokens, 1200);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg.store.lease_seconds, default_lease_seconds());
    }

    #[test]
    fn present_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            config_path(dir.path()),
            "[store]\nlease_seconds = 45\n\n[catalog]\nbatch_limit = 10\n",
        )
        .unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg.store.lease_seconds, 45);
        assert_eq!(cfg.catalog.batch_limit, 10);
        assert_eq!(cfg.policy.default_pull_max_tokens, default_pull_max_tokens());
    }

    #[test]
    fn merge_prefers_non_default_values_from_other() {
        let base = Config::default();
        let mut other = Config::default();
        other.store.lease_seconds = 99;
        let merged = base.merge(&other);
        assert_eq!(merged.store.lease_seconds, 99);
        assert_eq!(merged.catalog.batch_limit, default_batch_limit());
    }
}
