//! Semantic cache (C7).
//!
//! A bounded, in-process list of `(query_vector, response)` entries. A
//! lookup is a cosine-similarity scan against every live entry; a hit above
//! `cache_similarity_threshold` returns the stored response unchanged
//! (Design Notes (c): the cache keys on `query_vector` only, not on
//! `(query, intent)` — an accepted limitation, see `DESIGN.md`).
//!
//! Expiry is lazy: entries carry an insertion timestamp and are only swept
//! out once the cache has grown past `cache_sweep_threshold` entries,
//! rather than on a background timer (§4.7).

use std::time::{Duration, SystemTime};

use crate::config::Config;
use crate::embedding::cosine_similarity;

/// One cached `(query_vector, response)` pair.
#[derive(Debug, Clone)]
struct Entry {
    vector: Vec<f32>,
    response: String,
    inserted_at: SystemTime,
}

/// Bounded semantic cache over previously answered queries (C7).
///
/// Not internally synchronised; callers running the Supervisor across
/// threads wrap it in a `Mutex` (see [`crate::service::ServiceRegistry`]).
#[derive(Debug)]
pub struct SemanticCache {
    entries: Vec<Entry>,
    similarity_threshold: f32,
    ttl: Duration,
    max_entries: usize,
    sweep_threshold: usize,
}

impl SemanticCache {
    /// Builds a cache from the relevant `config` fields (C7).
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            entries: Vec::new(),
            similarity_threshold: config.cache_similarity_threshold,
            ttl: Duration::from_secs(u64::try_from(config.cache_ttl_hours.max(0)).unwrap_or(0) * 3600),
            max_entries: config.cache_max_entries,
            sweep_threshold: config.cache_sweep_threshold,
        }
    }

    /// Number of live (non-expired) entries without triggering a sweep.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache currently holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &Entry, now: SystemTime) -> bool {
        now.duration_since(entry.inserted_at).unwrap_or(Duration::ZERO) >= self.ttl
    }

    /// Sweeps expired entries if the cache has grown past
    /// `cache_sweep_threshold`; otherwise a no-op (§4.7's lazy-expiry rule).
    fn maybe_sweep(&mut self, now: SystemTime) {
        if self.entries.len() <= self.sweep_threshold {
            return;
        }
        self.entries.retain(|e| !self.is_expired(e, now));
    }

    /// Looks up the nearest cached entry for `query_vector`; returns the
    /// stored response verbatim on a hit at or above
    /// `cache_similarity_threshold`, skipping expired entries.
    #[must_use]
    pub fn lookup(&mut self, query_vector: &[f32]) -> Option<String> {
        self.lookup_at(query_vector, SystemTime::now())
    }

    fn lookup_at(&mut self, query_vector: &[f32], now: SystemTime) -> Option<String> {
        self.maybe_sweep(now);

        let mut best: Option<(f32, usize)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            if self.is_expired(entry, now) {
                continue;
            }
            let sim = cosine_similarity(query_vector, &entry.vector);
            if sim >= self.similarity_threshold && best.is_none_or(|(best_sim, _)| sim > best_sim) {
                best = Some((sim, idx));
            }
        }
        best.map(|(_, idx)| self.entries[idx].response.clone())
    }

    /// Inserts a new entry, evicting the oldest one if the cache is already
    /// at `cache_max_entries` (§4.7).
    pub fn insert(&mut self, query_vector: Vec<f32>, response: String) {
        self.insert_at(query_vector, response, SystemTime::now());
    }

    fn insert_at(&mut self, query_vector: Vec<f32>, response: String, now: SystemTime) {
        if self.entries.len() >= self.max_entries && !self.entries.is_empty() {
            self.entries.remove(0);
        }
        self.entries.push(Entry { vector: query_vector, response, inserted_at: now });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(max_entries: usize, sweep_threshold: usize, ttl_hours: i64) -> Config {
        Config {
            cache_max_entries: max_entries,
            cache_sweep_threshold: sweep_threshold,
            cache_ttl_hours: ttl_hours,
            cache_similarity_threshold: 0.92,
            ..Config::default()
        }
    }

    #[test]
    fn lookup_returns_none_on_empty_cache() {
        let mut cache = SemanticCache::new(&Config::default());
        assert!(cache.lookup(&[1.0, 0.0]).is_none());
    }

    #[test]
    fn insert_then_lookup_hits_on_identical_vector() {
        let mut cache = SemanticCache::new(&Config::default());
        cache.insert(vec![1.0, 0.0, 0.0], "cached answer".to_string());
        let hit = cache.lookup(&[1.0, 0.0, 0.0]);
        assert_eq!(hit.as_deref(), Some("cached answer"));
    }

    #[test]
    fn lookup_misses_below_similarity_threshold() {
        let mut cache = SemanticCache::new(&Config::default());
        cache.insert(vec![1.0, 0.0, 0.0], "cached answer".to_string());
        let hit = cache.lookup(&[0.0, 1.0, 0.0]);
        assert!(hit.is_none());
    }

    #[test]
    fn insert_evicts_oldest_when_over_capacity() {
        let mut cache = SemanticCache::new(&config_with(2, 1000, 24));
        cache.insert(vec![1.0, 0.0], "first".to_string());
        cache.insert(vec![0.0, 1.0], "second".to_string());
        cache.insert(vec![1.0, 1.0], "third".to_string());
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&[1.0, 0.0]).is_none());
    }

    #[test]
    fn expired_entries_are_invisible_to_lookup_even_before_sweep() {
        let mut cache = SemanticCache::new(&config_with(200, 1000, 0));
        let now = SystemTime::now();
        cache.insert_at(vec![1.0, 0.0], "stale".to_string(), now - Duration::from_secs(10));
        let hit = cache.lookup_at(&[1.0, 0.0], now);
        assert!(hit.is_none());
    }

    #[test]
    fn sweep_only_triggers_past_sweep_threshold() {
        let mut cache = SemanticCache::new(&config_with(200, 2, 0));
        let now = SystemTime::now();
        let old = now - Duration::from_secs(10);
        cache.insert_at(vec![1.0, 0.0], "a".to_string(), old);
        assert_eq!(cache.len(), 1);
        cache.insert_at(vec![0.0, 1.0], "b".to_string(), old);
        cache.insert_at(vec![1.0, 1.0], "c".to_string(), old);
        // length now exceeds sweep_threshold=2, next lookup should sweep all (expired, ttl=0)
        cache.lookup_at(&[5.0, 5.0], now);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn is_empty_reflects_entry_count() {
        let mut cache = SemanticCache::new(&Config::default());
        assert!(cache.is_empty());
        cache.insert(vec![1.0, 0.0], "x".to_string());
        assert!(!cache.is_empty());
    }
}
