//! # Query Optimizer and Result Cache
//!
//! Read-query results are cached for a TTL, keyed by the normalised
//! statement and its bound parameters. The statement itself always runs as
//! the caller wrote it. Anything that can change data, including
//! data-modifying CTEs, `RETURNING` writes and row locks, bypasses the cache
//! and clears it.

use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::QueryCacheConfig;
use crate::database::session::QueryResult;
use crate::database::statement::{normalize, StatementShape};

/// Result caching consulted by `execute_query`
pub trait QueryOptimizer: Send + Sync {
    /// Cached result for a statement, if still fresh
    fn cached(&self, query: &str, params: &[Value]) -> Option<QueryResult>;

    /// Observe an executed statement and its result
    fn store(&self, query: &str, params: &[Value], result: &QueryResult);
}

#[derive(Debug, Clone)]
struct CachedResult {
    result: QueryResult,
    cached_at: Instant,
}

/// dashmap-backed [`QueryOptimizer`]
#[derive(Debug)]
pub struct CachingQueryOptimizer {
    entries: DashMap<String, CachedResult>,
    ttl: Duration,
    max_entries: usize,
    enabled: bool,
}

impl CachingQueryOptimizer {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            enabled: max_entries > 0,
        }
    }

    pub fn from_config(config: &QueryCacheConfig) -> Self {
        let mut optimizer = Self::new(config.ttl_duration(), config.max_entries);
        optimizer.enabled = config.enabled && config.max_entries > 0;
        optimizer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn invalidate_all(&self) {
        let cleared = self.entries.len();
        self.entries.clear();
        if cleared > 0 {
            debug!(cleared = cleared, "Invalidated query cache");
        }
    }

    /// Drop entries older than the TTL
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
    }

    fn cache_key(query: &str, params: &[Value]) -> String {
        format!("{}|{}", normalize(query), Value::Array(params.to_vec()))
    }

    fn make_room(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        self.purge_expired();
        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().cached_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl QueryOptimizer for CachingQueryOptimizer {
    fn cached(&self, query: &str, params: &[Value]) -> Option<QueryResult> {
        if !self.enabled || !StatementShape::of(query).is_cacheable() {
            return None;
        }
        let key = Self::cache_key(query, params);
        let fresh = self
            .entries
            .get(&key)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| entry.result.clone());

        if fresh.is_none() {
            // Expired entries are removed lazily
            self.entries.remove_if(&key, |_, entry| entry.cached_at.elapsed() >= self.ttl);
        } else {
            debug!(key = %key, "Query cache hit");
        }
        fresh
    }

    fn store(&self, query: &str, params: &[Value], result: &QueryResult) {
        if !self.enabled {
            return;
        }
        if !StatementShape::of(query).is_cacheable() {
            self.invalidate_all();
            return;
        }
        self.make_room();
        self.entries.insert(
            Self::cache_key(query, params),
            CachedResult {
                result: result.clone(),
                cached_at: Instant::now(),
            },
        );
    }
}
