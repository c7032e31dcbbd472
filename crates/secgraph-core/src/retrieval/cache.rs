//! Retrieval result cache
//!
//! Keyed by a fingerprint of the retrieval inputs (sorted seed ids, depth
//! and filters). Entries expire after a short TTL and are invalidated
//! whenever the store's write generation moves, so a cached bundle never
//! outlives the graph state it was computed from.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::retrieval::bundle::ContextBundle;
use crate::retrieval::expander::ExpandOptions;

/// Default time-to-live for cached bundles
const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    bundle: ContextBundle,
    generation: u64,
    inserted_at: Instant,
}

/// In-process cache of assembled context bundles
pub struct RetrievalCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for RetrievalCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl RetrievalCache {
    /// Create a cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Fingerprint of one retrieval's inputs
    pub fn fingerprint(seed_ids: &[String], opts: &ExpandOptions) -> String {
        let mut sorted = seed_ids.to_vec();
        sorted.sort();

        let relations = opts
            .relations
            .as_ref()
            .map(|rels| {
                rels.iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();
        let node_types = opts
            .node_types
            .as_ref()
            .map(|types| {
                types
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();

        format!(
            "{}|{}|{}|{}|{:?}",
            sorted.join(","),
            opts.depth,
            relations,
            node_types,
            opts.direction
        )
    }

    /// Look up a bundle; misses if absent, expired, or computed against an
    /// older store generation
    pub fn get(&self, key: &str, current_generation: u64) -> Option<ContextBundle> {
        let mut entries = self.entries.lock().ok()?;

        match entries.get(key) {
            Some(entry)
                if entry.generation == current_generation
                    && entry.inserted_at.elapsed() < self.ttl =>
            {
                debug!(key = %key, "Retrieval cache hit");
                Some(entry.bundle.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a bundle computed at the given store generation
    pub fn put(&self, key: String, generation: u64, bundle: ContextBundle) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    bundle,
                    generation,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Number of live entries (for tests and diagnostics)
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
