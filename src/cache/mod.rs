//! Request-scoped hot tier in front of the store
//!
//! Two tiers share one bounded cache: memory rows keyed by id (kept until
//! evicted) and ranked search results keyed by a deterministic fingerprint
//! (expire after a TTL, 30 minutes by default). Loads are single-flight per
//! fingerprint; mutations invalidate before the store call returns.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::types::{Memory, MemoryId, SearchFilters, SearchHit};

struct IdEntry {
    memory: Memory,
    last_access: AtomicU64,
}

struct SearchEntry {
    hits: Vec<SearchHit>,
    created_at: Instant,
    last_access: AtomicU64,
}

/// Observable cache counters
#[derive(Debug, Default)]
pub struct CacheCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub invalidations: AtomicU64,
    pub coalesces: AtomicU64,
}

/// Serializable snapshot of the counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub id_entries: usize,
    pub search_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub coalesces: u64,
}

/// Bounded in-process cache coordinated with the store
pub struct MemoryCache {
    ids: DashMap<MemoryId, Arc<IdEntry>>,
    searches: DashMap<String, Arc<SearchEntry>>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
    capacity: usize,
    search_ttl: Duration,
    epoch: Instant,
    stats: CacheCounters,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ids: DashMap::new(),
            searches: DashMap::new(),
            inflight: DashMap::new(),
            capacity: config.capacity.max(1),
            search_ttl: config.search_ttl,
            epoch: Instant::now(),
            stats: CacheCounters::default(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Deterministic key for a search: normalized query + filter tuple + limit
    pub fn fingerprint(query: &str, filters: &SearchFilters, limit: i64) -> String {
        let normalized = query
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update([0]);
        hasher.update(format!("{:?}", filters.min_importance).as_bytes());
        hasher.update([0]);
        if let Some(categories) = &filters.categories {
            let mut sorted = categories.clone();
            sorted.sort();
            hasher.update(sorted.join(",").as_bytes());
        }
        hasher.update([0]);
        hasher.update(filters.project.as_deref().unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update(filters.session.as_deref().unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update(limit.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a memory row by id
    pub fn get_memory(&self, id: MemoryId) -> Option<Memory> {
        match self.ids.get(&id) {
            Some(entry) => {
                entry.last_access.store(self.now_millis(), Ordering::Relaxed);
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.memory.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or refresh a memory row
    pub fn put_memory(&self, memory: Memory) {
        if self.ids.len() >= self.capacity {
            self.evict_oldest_id();
        }
        let entry = IdEntry {
            memory: memory.clone(),
            last_access: AtomicU64::new(self.now_millis()),
        };
        self.ids.insert(memory.id, Arc::new(entry));
    }

    /// Cached search results for a fingerprint, honoring the TTL
    pub fn get_search(&self, fingerprint: &str) -> Option<Vec<SearchHit>> {
        if let Some(entry) = self.searches.get(fingerprint) {
            if entry.created_at.elapsed() <= self.search_ttl {
                entry.last_access.store(self.now_millis(), Ordering::Relaxed);
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.hits.clone());
            }
            drop(entry);
            self.searches.remove(fingerprint);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store search results under a fingerprint
    pub fn put_search(&self, fingerprint: &str, hits: Vec<SearchHit>) {
        if self.searches.len() >= self.capacity {
            self.evict_oldest_search();
        }
        let entry = SearchEntry {
            hits,
            created_at: Instant::now(),
            last_access: AtomicU64::new(self.now_millis()),
        };
        self.searches.insert(fingerprint.to_string(), Arc::new(entry));
    }

    /// Load-through with at most one concurrent loader per fingerprint
    ///
    /// Concurrent callers on the same key block on the gate and then share
    /// the freshly cached result. Loader errors propagate and are never
    /// cached; a `NotFound`-shaped empty result is cached like any other.
    pub fn search_through<F>(&self, fingerprint: &str, loader: F) -> Result<Vec<SearchHit>>
    where
        F: FnOnce() -> Result<Vec<SearchHit>>,
    {
        if let Some(hits) = self.get_search(fingerprint) {
            return Ok(hits);
        }

        let gate = self
            .inflight
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock();

        // Another caller may have completed the load while we waited.
        if let Some(hits) = self.get_search(fingerprint) {
            self.stats.coalesces.fetch_add(1, Ordering::Relaxed);
            return Ok(hits);
        }

        let result = loader();
        if let Ok(hits) = &result {
            self.put_search(fingerprint, hits.clone());
        }
        drop(_guard);
        self.inflight.remove(fingerprint);
        result
    }

    /// Drop the id entry and every search result that contains the id
    ///
    /// Called before the mutating store call returns, so a stale row can
    /// never be observed through the cache.
    pub fn invalidate_memory(&self, id: MemoryId) {
        if self.ids.remove(&id).is_some() {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        self.searches.retain(|_, entry| {
            let contains = entry.hits.iter().any(|h| h.memory.id == id);
            if contains {
                self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
            }
            !contains
        });
    }

    /// Clear every cached search result (write path, best-effort)
    pub fn invalidate_searches(&self) {
        let count = self.searches.len() as u64;
        self.searches.clear();
        self.stats.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    /// Clear both tiers
    pub fn clear(&self) {
        let count = (self.searches.len() + self.ids.len()) as u64;
        self.searches.clear();
        self.ids.clear();
        self.stats.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    fn evict_oldest_id(&self) {
        let mut oldest: Option<(MemoryId, u64)> = None;
        for entry in self.ids.iter() {
            let access = entry.last_access.load(Ordering::Relaxed);
            if oldest.map(|(_, t)| access < t).unwrap_or(true) {
                oldest = Some((*entry.key(), access));
            }
        }
        if let Some((key, _)) = oldest {
            self.ids.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn evict_oldest_search(&self) {
        let mut oldest: Option<(String, u64)> = None;
        for entry in self.searches.iter() {
            let access = entry.last_access.load(Ordering::Relaxed);
            if oldest.as_ref().map(|(_, t)| access < *t).unwrap_or(true) {
                oldest = Some((entry.key().clone(), access));
            }
        }
        if let Some((key, _)) = oldest {
            self.searches.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counter snapshot for logging and stats responses
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            id_entries: self.ids.len(),
            search_entries: self.searches.len(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            invalidations: self.stats.invalidations.load(Ordering::Relaxed),
            coalesces: self.stats.coalesces.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryMetadata;

    fn test_cache() -> MemoryCache {
        MemoryCache::new(&CacheConfig::default())
    }

    fn make_memory(id: i64, content: &str) -> Memory {
        Memory {
            id,
            content: content.to_string(),
            metadata: MemoryMetadata::default(),
            created_at: chrono::Utc::now(),
        }
    }

    fn make_hit(id: i64, content: &str) -> SearchHit {
        SearchHit {
            memory: make_memory(id, content),
            score: 1.0,
            reasoning: String::new(),
        }
    }

    #[test]
    fn fingerprint_normalizes_query() {
        let filters = SearchFilters::default();
        assert_eq!(
            MemoryCache::fingerprint("  JWT   Refresh ", &filters, 10),
            MemoryCache::fingerprint("jwt refresh", &filters, 10),
        );
        assert_ne!(
            MemoryCache::fingerprint("jwt refresh", &filters, 10),
            MemoryCache::fingerprint("jwt refresh", &filters, 20),
        );
    }

    #[test]
    fn fingerprint_sensitive_to_filters() {
        let a = SearchFilters {
            project: Some("api".to_string()),
            ..Default::default()
        };
        let b = SearchFilters::default();
        assert_ne!(
            MemoryCache::fingerprint("q", &a, 10),
            MemoryCache::fingerprint("q", &b, 10),
        );
    }

    #[test]
    fn id_lookup_hit_after_miss() {
        let cache = test_cache();
        assert!(cache.get_memory(1).is_none());
        cache.put_memory(make_memory(1, "hello"));
        assert_eq!(cache.get_memory(1).unwrap().content, "hello");

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn invalidation_drops_matching_search_entries() {
        let cache = test_cache();
        cache.put_search("fp1", vec![make_hit(1, "a"), make_hit(2, "b")]);
        cache.put_search("fp2", vec![make_hit(3, "c")]);
        cache.put_memory(make_memory(1, "a"));

        cache.invalidate_memory(1);
        assert!(cache.get_memory(1).is_none());
        assert!(cache.get_search("fp1").is_none());
        assert!(cache.get_search("fp2").is_some());
    }

    #[test]
    fn search_ttl_expires() {
        let config = CacheConfig {
            capacity: 10,
            search_ttl: Duration::from_millis(0),
        };
        let cache = MemoryCache::new(&config);
        cache.put_search("fp", vec![make_hit(1, "a")]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_search("fp").is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let config = CacheConfig {
            capacity: 2,
            search_ttl: Duration::from_secs(60),
        };
        let cache = MemoryCache::new(&config);
        cache.put_memory(make_memory(1, "a"));
        std::thread::sleep(Duration::from_millis(2));
        cache.put_memory(make_memory(2, "b"));
        std::thread::sleep(Duration::from_millis(2));
        // Touch 1 so 2 becomes the eviction candidate
        cache.get_memory(1);
        std::thread::sleep(Duration::from_millis(2));
        cache.put_memory(make_memory(3, "c"));

        assert!(cache.get_memory(1).is_some());
        assert!(cache.get_memory(2).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn single_flight_coalesces_waiters() {
        use std::sync::atomic::AtomicUsize;

        let cache = Arc::new(test_cache());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let loads = loads.clone();
            handles.push(std::thread::spawn(move || {
                cache
                    .search_through("fp", || {
                        loads.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        Ok(vec![make_hit(1, "loaded")])
                    })
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 1);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.stats().coalesces >= 1);
    }

    #[test]
    fn loader_errors_are_not_cached() {
        let cache = test_cache();
        let err = cache.search_through("fp", || {
            Err(crate::error::DurandalError::Internal("load failed".into()))
        });
        assert!(err.is_err());

        let ok = cache
            .search_through("fp", || Ok(vec![make_hit(1, "second try")]))
            .unwrap();
        assert_eq!(ok.len(), 1);
    }
}
