use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type CacheKey = String;
pub type CacheValue = Arc<[u8]>;

const DEFAULT_CACHE_SIZE_MB: usize = 32;
const AVG_ENCODED_IMAGE_SIZE: usize = 80 * 1024; // 80KB average encoded image
const DEFAULT_MAX_ENTRIES: usize = (DEFAULT_CACHE_SIZE_MB * 1024 * 1024) / AVG_ENCODED_IMAGE_SIZE;

struct Entries {
    lru: LruCache<CacheKey, CacheValue>,
    total_bytes: usize,
}

/// In-memory LRU of encoded image bytes, bounded by entry count and bytes.
#[derive(Clone)]
pub struct DataCache {
    entries: Arc<Mutex<Entries>>,
    byte_budget: usize,
}

impl std::fmt::Debug for DataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCache")
            .field("byte_budget", &self.byte_budget)
            .finish_non_exhaustive()
    }
}

impl DataCache {
    pub fn new(max_entries: usize, byte_budget: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: Arc::new(Mutex::new(Entries {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            })),
            byte_budget,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_CACHE_SIZE_MB * 1024 * 1024)
    }

    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let mut entries = self.entries.lock().await;
        entries.lru.get(key).cloned()
    }

    /// Returns `false` when the value alone exceeds the byte budget and was
    /// not stored.
    pub async fn put(&self, key: CacheKey, value: CacheValue) -> bool {
        let size = value.len();
        if size > self.byte_budget {
            tracing::debug!("Refusing {size} byte entry for {key}: over budget");
            return false;
        }

        let mut entries = self.entries.lock().await;
        if let Some((_, displaced)) = entries.lru.push(key, value) {
            entries.total_bytes -= displaced.len();
        }
        entries.total_bytes += size;

        while entries.total_bytes > self.byte_budget {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => entries.total_bytes -= evicted.len(),
                None => break,
            }
        }

        true
    }

    pub async fn remove(&self, key: &str) -> Option<CacheValue> {
        let mut entries = self.entries.lock().await;
        let removed = entries.lru.pop(key);
        if let Some(value) = &removed {
            entries.total_bytes -= value.len();
        }
        removed
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.lru.clear();
        entries.total_bytes = 0;
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.lru.is_empty()
    }

    pub async fn total_bytes(&self) -> usize {
        self.entries.lock().await.total_bytes
    }

    pub fn byte_budget(&self) -> usize {
        self.byte_budget
    }

    pub async fn get_memory_usage_mb(&self) -> f64 {
        self.total_bytes().await as f64 / (1024.0 * 1024.0)
    }
}

impl Default for DataCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(len: usize) -> CacheValue {
        vec![7u8; len].into()
    }

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = DataCache::with_defaults();
        let key = "https://example.com/a.png".to_string();
        let value: CacheValue = vec![1, 2, 3, 4].into();

        assert!(cache.get(&key).await.is_none());

        assert!(cache.put(key.clone(), value.clone()).await);

        let retrieved = cache.get(&key).await;
        assert_eq!(retrieved, Some(value));
        assert_eq!(cache.total_bytes().await, 4);

        let removed = cache.remove(&key).await;
        assert_eq!(removed.as_deref(), Some(&[1u8, 2, 3, 4][..]));
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.total_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_byte_budget_evicts_least_recent() {
        let cache = DataCache::new(10, 100);

        cache.put("a".into(), bytes(40)).await;
        cache.put("b".into(), bytes(40)).await;
        // Touch "a" so "b" becomes least recently used
        cache.get("a").await;
        cache.put("c".into(), bytes(40)).await;

        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("c").await.is_some());
        assert_eq!(cache.total_bytes().await, 80);
    }

    #[tokio::test]
    async fn test_replacing_key_adjusts_total() {
        let cache = DataCache::new(10, 100);

        cache.put("a".into(), bytes(30)).await;
        cache.put("a".into(), bytes(10)).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.total_bytes().await, 10);
    }

    #[tokio::test]
    async fn test_oversized_entry_is_refused() {
        let cache = DataCache::new(10, 16);

        assert!(!cache.put("big".into(), bytes(17)).await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_entry_capacity_eviction_adjusts_total() {
        let cache = DataCache::new(2, 1000);

        cache.put("a".into(), bytes(10)).await;
        cache.put("b".into(), bytes(20)).await;
        cache.put("c".into(), bytes(30)).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.total_bytes().await, 50);
    }
}
