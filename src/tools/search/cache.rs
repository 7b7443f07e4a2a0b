//! TTL cache for search responses.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::tools::search::{SearchRequest, SearchResponse};

#[derive(Clone)]
struct CacheEntry {
    response: SearchResponse,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe cache keyed by query, topic and result count.
pub struct SearchCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl SearchCache {
    /// Cache with the given TTL and size bound. A zero TTL or size disables
    /// caching.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    const fn enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    fn key(request: &SearchRequest) -> String {
        format!(
            "{}:{}:{}",
            request.topic.as_str(),
            request.max_results,
            request.query.trim().to_lowercase()
        )
    }

    /// Cached response for `request`, if fresh.
    #[must_use]
    pub fn get(&self, request: &SearchRequest) -> Option<SearchResponse> {
        if !self.enabled() {
            return None;
        }
        let key = Self::key(request);
        let entry = self.entries.get(&key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.response.clone())
    }

    /// Store `response` for `request`.
    pub fn insert(&self, request: &SearchRequest, response: &SearchResponse) {
        if !self.enabled() {
            return;
        }
        self.enforce_max_entries();
        self.entries.insert(
            Self::key(request),
            CacheEntry {
                response: response.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn enforce_max_entries(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        self.entries.retain(|_, entry| !entry.is_expired());
        if self.entries.len() >= self.max_entries {
            let to_remove = self.entries.len() - self.max_entries + 1;
            let keys: Vec<String> = self
                .entries
                .iter()
                .take(to_remove)
                .map(|entry| entry.key().clone())
                .collect();
            for key in keys {
                self.entries.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::search::{SearchHit, SearchTopic};

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            topic: SearchTopic::News,
            max_results: 5,
        }
    }

    fn response() -> SearchResponse {
        SearchResponse {
            answer: None,
            results: vec![SearchHit {
                title: "t".to_string(),
                url: "https://example.com".to_string(),
                snippet: "s".to_string(),
            }],
        }
    }

    #[test]
    fn test_hit_ignores_case_and_padding() {
        let cache = SearchCache::new(Duration::from_secs(60), 8);
        cache.insert(&request("EV news"), &response());
        assert_eq!(cache.get(&request("  ev NEWS ")), Some(response()));
        assert!(cache.get(&request("chip news")).is_none());
    }

    #[test]
    fn test_topic_is_part_of_the_key() {
        let cache = SearchCache::new(Duration::from_secs(60), 8);
        cache.insert(&request("ev"), &response());
        let general = SearchRequest {
            topic: SearchTopic::General,
            ..request("ev")
        };
        assert!(cache.get(&general).is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = SearchCache::new(Duration::from_millis(1), 8);
        cache.insert(&request("ev"), &response());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&request("ev")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_size_bound_and_disabled() {
        let cache = SearchCache::new(Duration::from_secs(60), 2);
        for q in ["a", "b", "c"] {
            cache.insert(&request(q), &response());
        }
        assert_eq!(cache.len(), 2);

        let disabled = SearchCache::new(Duration::ZERO, 2);
        disabled.insert(&request("a"), &response());
        assert!(disabled.get(&request("a")).is_none());
    }
}
