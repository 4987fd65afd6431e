//! Decoded-tile LRU cache shared by reads of the same COG.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

/// Tile identity within one file: (overview level, tile index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub level: usize,
    pub tile_idx: usize,
}

/// Thread-safe LRU of decompressed, predictor-reversed tile bytes.
pub struct TileCache {
    inner: Mutex<LruCache<TileKey, Arc<Vec<u8>>>>,
}

impl TileCache {
    /// Cache holding up to `capacity` tiles (at least one).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, key: &TileKey) -> Option<Arc<Vec<u8>>> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: TileKey, data: Arc<Vec<u8>>) {
        self.lock().put(key, data);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<TileKey, Arc<Vec<u8>>>> {
        // a poisoned cache only loses cached tiles
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
