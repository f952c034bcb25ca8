//! Page cache for rendered pages
//!
//! The cache does not bound itself: inserting never evicts. Trimming to the
//! session's buffer size is a separate pass driven by the eviction policy.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::Bitmap;

/// Rendered pages keyed by 1-based page number
#[derive(Debug, Default)]
pub struct PageCache {
    pages: HashMap<usize, Arc<Bitmap>>,
}

impl PageCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached page
    #[must_use]
    pub fn get(&self, page: usize) -> Option<Arc<Bitmap>> {
        self.pages.get(&page).cloned()
    }

    /// Check if a page is cached
    #[must_use]
    pub fn contains(&self, page: usize) -> bool {
        self.pages.contains_key(&page)
    }

    /// Insert or overwrite a page, returning an Arc to the data
    pub fn put(&mut self, page: usize, bitmap: Bitmap) -> Arc<Bitmap> {
        let arc = Arc::new(bitmap);
        self.pages.insert(page, Arc::clone(&arc));
        arc
    }

    /// Drop one page, releasing the cache's hold on its bitmap
    pub fn remove(&mut self, page: usize) -> Option<Arc<Bitmap>> {
        self.pages.remove(&page)
    }

    /// Release every cached page
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Cached page numbers in ascending order
    #[must_use]
    pub fn pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.pages.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    /// Number of cached pages
    #[must_use]
    pub fn size(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Pixel memory held by all cached pages
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.pages.values().map(|b| b.byte_size()).sum()
    }
}
