//! The catalog-brief cache: an ordered map keyed by a fingerprint of
//! `(project, task_type, token_budget, catalog_version, prompt)`, bounded by
//! both entry count and age. Both bounds evict independently of each other.
//!
//! The reference implementation's single-threaded host needed no locking;
//! this port is shared behind a `Mutex` so it stays correct under a worker
//! pool even though nothing in this crate spawns threads itself.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use memoryhub_types::CatalogBriefResponse;

struct Entry {
    value: CatalogBriefResponse,
    inserted_at: Instant,
}

/// Capacity- and TTL-bounded LRU cache. `order` tracks keys from
/// least-recently-used (front) to most-recently-used (back).
pub struct BriefCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

impl BriefCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Returns a clone of the cached value if present and not expired. A
    /// hit moves the key to the most-recently-used position; an expired
    /// entry is evicted and treated as a miss.
    pub fn get(&mut self, key: &str) -> Option<CatalogBriefResponse> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.remove(key);
            return None;
        }
        self.touch(key);
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn put(&mut self, key: String, value: CatalogBriefResponse) {
        if self.entries.contains_key(&key) {
            self.touch(&key);
        } else {
            self.order.push(key.clone());
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        self.evict_over_capacity();
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let key = self.order.remove(pos);
            self.order.push(key);
        }
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    fn evict_over_capacity(&mut self) {
        while self.order.len() > self.capacity {
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
        }
    }
}
