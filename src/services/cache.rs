//! TTL cache with a bounded entry count.

use dashmap::DashMap;
use std::future::Future;
use std::time::Duration;

struct Entry {
    value: String,
    expires_at_ms: i64,
    created_at_ms: i64,
    hits: u64,
}

pub struct Cache {
    entries: DashMap<String, Entry>,
    max_entries: usize,
}

impl Cache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    pub fn get(&self, key: &str, now_ms: i64) -> Option<String> {
        let mut entry = self.entries.get_mut(key)?;
        if entry.expires_at_ms <= now_ms {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        entry.hits += 1;
        Some(entry.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration, now_ms: i64) {
        let key = key.into();
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            Entry {
                value: value.into(),
                expires_at_ms: now_ms + ttl.as_millis() as i64,
                created_at_ms: now_ms,
                hits: 0,
            },
        );
    }

    fn evict_oldest(&self) {
        if let Some(oldest_key) = self
            .entries
            .iter()
            .min_by_key(|e| e.value().created_at_ms)
            .map(|e| e.key().clone())
        {
            self.entries.remove(&oldest_key);
        }
    }

    /// `get_or_set`: not guaranteed to be single-flight —
    /// a cold-key stampede may invoke `producer` more than once concurrently.
    pub async fn get_or_set<F, Fut>(&self, key: &str, ttl: Duration, now_ms: i64, producer: F) -> String
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = String>,
    {
        if let Some(value) = self.get(key, now_ms) {
            return value;
        }
        let value = producer().await;
        self.set(key.to_string(), value.clone(), ttl, now_ms);
        value
    }

    pub fn sweep(&self, now_ms: i64) {
        self.entries.retain(|_, e| e.expires_at_ms > now_ms);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn set_then_get_round_trips() {
        let cache = Cache::new(10);
        cache.set("k", "v", Duration::from_secs(60), 0);
        assert_eq!(cache.get("k", 0), Some("v".to_string()));
    }

    #[test]
    fn expired_entries_return_none() {
        let cache = Cache::new(10);
        cache.set("k", "v", Duration::from_millis(10), 0);
        assert_eq!(cache.get("k", 100), None);
    }

    #[test]
    fn capacity_bound_evicts_oldest() {
        let cache = Cache::new(2);
        cache.set("a", "1", Duration::from_secs(60), 0);
        cache.set("b", "2", Duration::from_secs(60), 1);
        cache.set("c", "3", Duration::from_secs(60), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a", 3), None);
    }

    #[tokio::test]
    async fn get_or_set_populates_on_miss() {
        let cache = Cache::new(10);
        let value = cache
            .get_or_set("k", Duration::from_secs(60), 0, || async { "computed".to_string() })
            .await;
        assert_eq!(value, "computed");
        assert_eq!(cache.get("k", 0), Some("computed".to_string()));
    }
}
