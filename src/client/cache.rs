//! TTL cache for GET responses.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// String-keyed cache whose entries expire after a fixed TTL.
#[derive(Debug)]
pub struct ResponseCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh value for `key`; an expired entry is evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &str, value: V) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, (stored_at, _)| now.duration_since(*stored_at) < self.ttl);
        entries.insert(key.to_owned(), (now, value));
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_fresh_entries() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("/api/user", 1);
        assert_eq!(cache.get("/api/user"), Some(1));
        assert_eq!(cache.get("/other"), None);
    }

    #[test]
    fn expired_entries_are_evicted() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("k", "v".to_string());
        {
            let mut entries = cache.entries.lock();
            let entry = entries.get_mut("k").unwrap();
            entry.0 = Instant::now().checked_sub(Duration::from_secs(61)).unwrap();
        }
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_overwrites() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
    }
}
