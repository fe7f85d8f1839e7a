use std::hash::Hash;
use std::time::{Duration, Instant};

use moka::sync::Cache;

#[derive(Clone)]
struct Entry<V> {
    expires_at: Instant,
    value: V,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Bounded cache whose entries carry their own validity. An expired entry is never
/// returned and is evicted on the next read.
#[derive(Clone)]
pub struct ExpiringCache<K, V> {
    cache: Cache<K, Entry<V>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: 'static + Eq + Hash + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    pub fn new(capacity: u64) -> Self {
        Self { cache: Cache::new(capacity) }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.cache.get(key)?;
        if entry.is_expired() {
            self.cache.invalidate(key);
            return None;
        }

        Some(entry.value)
    }

    pub fn insert(&self, key: K, value: V, validity: Duration) {
        self.cache.insert(
            key,
            Entry {
                expires_at: Instant::now() + validity,
                value,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_returns_fresh_value() {
        let cache = ExpiringCache::new(16);
        cache.insert("0xabc".to_string(), 12345u64, Duration::from_secs(5));

        assert_eq!(cache.get(&"0xabc".to_string()), Some(12345));
    }

    #[test]
    fn cache_drops_expired_value() {
        let cache = ExpiringCache::new(16);
        cache.insert(1u8, 1u64, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(3));

        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn zero_validity_is_never_served() {
        let cache = ExpiringCache::new(16);
        cache.insert(1u8, 1u64, Duration::ZERO);

        assert_eq!(cache.get(&1), None);
    }
}
