//! Bounded-lifetime result cache for provider calls.
//!
//! Keys are sha256 digests of (operation name, canonicalized arguments);
//! values expire after a fixed TTL. Injected into provider clients at
//! construction so tests can substitute a no-op cache.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default lifetime for cached provider results (30 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A cache that never hits (zero TTL), for tests and one-shot commands
    pub fn no_op() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Fetch a live entry; expired entries are evicted on access
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, value: V) {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(key, (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Build a cache key from an operation name and its canonicalized arguments
pub fn cache_key(operation: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    for part in parts {
        hasher.update([0x1f]);
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let key = cache_key("prices", &["SPY", "2024-01-01", "2024-06-30"]);
        assert_eq!(cache.get(&key), None);

        cache.put(key.clone(), 42);
        assert_eq!(cache.get(&key), Some(42));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_no_op_cache_never_hits() {
        let cache = TtlCache::no_op();
        cache.put("k".to_string(), 1);
        assert_eq!(cache.get("k"), None);
        // The expired entry was evicted on access
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_depend_on_operation_and_arguments() {
        let a = cache_key("prices", &["SPY"]);
        let b = cache_key("prices", &["AGG"]);
        let c = cache_key("series", &["SPY"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, cache_key("prices", &["SPY"]));
    }
}
