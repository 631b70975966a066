//! Decoded image caching

use crate::container::ImageContainer;
use lru::LruCache;
use std::{
    collections::HashSet,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

struct Rendered {
    lru: LruCache<String, Arc<ImageContainer>>,
    total_bytes: usize,
}

impl Rendered {
    fn evict_to(&mut self, byte_budget: usize) -> usize {
        let mut evicted = 0;
        while self.total_bytes > byte_budget {
            match self.lru.pop_lru() {
                Some((_, image)) => {
                    self.total_bytes -= image.byte_cost();
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// Thread-safe LRU of decoded images, bounded by entry count and pixel bytes
#[derive(Clone)]
pub struct RenderedCache {
    images: Arc<Mutex<Rendered>>,
    pending: Arc<Mutex<HashSet<String>>>,
    byte_budget: usize,
}

impl RenderedCache {
    /// Create a new cache with specified capacity
    pub fn new(capacity: usize, byte_budget: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            images: Arc::new(Mutex::new(Rendered {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            })),
            pending: Arc::new(Mutex::new(HashSet::new())),
            byte_budget,
        }
    }

    /// Create with default capacities
    pub fn with_defaults() -> Self {
        Self::new(200, 64 * 1024 * 1024)
    }

    pub fn resize(&self, new_capacity: usize) {
        if let Ok(mut images) = self.images.lock() {
            let capacity = NonZeroUsize::new(new_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
            while images.lru.len() > capacity.get() {
                if let Some((_, image)) = images.lru.pop_lru() {
                    images.total_bytes -= image.byte_cost();
                }
            }
            images.lru.resize(capacity);
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<ImageContainer>> {
        self.images.lock().ok()?.lru.get(key).cloned()
    }

    /// Insert an image, evicting least recently used entries over budget.
    /// Images larger than the whole budget are not cached.
    pub fn insert(&self, key: String, image: Arc<ImageContainer>) -> bool {
        self.clear_pending(&key);

        let cost = image.byte_cost();
        if cost > self.byte_budget {
            tracing::debug!("Not caching {key}: {cost} bytes exceeds budget");
            return false;
        }

        let Ok(mut images) = self.images.lock() else {
            return false;
        };

        if let Some((_, displaced)) = images.lru.push(key, image) {
            images.total_bytes -= displaced.byte_cost();
        }
        images.total_bytes += cost;

        let evicted = images.evict_to(self.byte_budget);
        if evicted > 0 {
            tracing::debug!("Evicted {evicted} decoded images over budget");
        }

        true
    }

    pub fn remove(&self, key: &str) -> Option<Arc<ImageContainer>> {
        let mut images = self.images.lock().ok()?;
        let removed = images.lru.pop(key)?;
        images.total_bytes -= removed.byte_cost();
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.images.lock().map(|images| images.lru.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.images
            .lock()
            .map(|images| images.total_bytes)
            .unwrap_or(0)
    }

    /// Check if a key is pending load
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .map(|set| set.contains(key))
            .unwrap_or(false)
    }

    /// Mark a key as pending load
    pub fn set_pending(&self, key: String) {
        if let Ok(mut set) = self.pending.lock() {
            set.insert(key);
        }
    }

    /// Clear pending status for a key
    pub fn clear_pending(&self, key: &str) {
        if let Ok(mut set) = self.pending.lock() {
            set.remove(key);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Clear cached images. Pending markers are left alone since their
    /// fetches are still running.
    pub fn clear(&self) {
        if let Ok(mut images) = self.images.lock() {
            images.lru.clear();
            images.total_bytes = 0;
        }
    }
}

impl Default for RenderedCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};

    fn container(width: u32, height: u32) -> Arc<ImageContainer> {
        Arc::new(ImageContainer::new(
            DynamicImage::ImageRgba8(RgbaImage::new(width, height)),
            None,
        ))
    }

    #[test]
    fn test_insert_and_get() {
        let cache = RenderedCache::new(4, 1024);
        cache.set_pending("a".into());
        assert!(cache.is_pending("a"));

        assert!(cache.insert("a".into(), container(4, 4)));

        assert!(!cache.is_pending("a"));
        assert_eq!(cache.get("a").unwrap().dimensions().width, 4);
        assert_eq!(cache.total_bytes(), 64);
    }

    #[test]
    fn test_byte_budget_eviction() {
        // Each 4x4 RGBA image costs 64 bytes
        let cache = RenderedCache::new(10, 128);

        cache.insert("a".into(), container(4, 4));
        cache.insert("b".into(), container(4, 4));
        cache.get("a");
        cache.insert("c".into(), container(4, 4));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.total_bytes(), 128);
    }

    #[test]
    fn test_oversized_image_not_cached() {
        let cache = RenderedCache::new(10, 32);
        assert!(!cache.insert("big".into(), container(4, 4)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_resize_shrinks_and_accounts() {
        let cache = RenderedCache::new(3, 1024);
        cache.insert("a".into(), container(2, 2));
        cache.insert("b".into(), container(2, 2));
        cache.insert("c".into(), container(2, 2));

        cache.resize(1);

        assert_eq!(cache.len(), 1);
        assert!(cache.get("c").is_some());
        assert_eq!(cache.total_bytes(), 16);
    }

    #[test]
    fn test_clear_keeps_pending() {
        let cache = RenderedCache::new(3, 1024);
        cache.insert("a".into(), container(2, 2));
        cache.set_pending("b".into());

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
        assert_eq!(cache.pending_count(), 1);
        assert!(cache.remove("a").is_none());
    }
}
