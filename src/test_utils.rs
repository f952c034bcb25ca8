//! Scriptable render backend for tests

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::flip::{
    Bitmap, DocumentHandle, LoadFailure, RenderBackend, RenderFailure, RenderParams,
};

/// Page size in points at scale 1.0
pub const PAGE_SIZE: (f32, f32) = (60.0, 80.0);

/// Pixel size of a page rendered at `scale`
pub fn page_pixels(scale: f32) -> (u32, u32) {
    (
        (PAGE_SIZE.0 * scale).round().max(1.0) as u32,
        (PAGE_SIZE.1 * scale).round().max(1.0) as u32,
    )
}

/// Backend with a fixed page count that counts every render and fails
/// pages on demand
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    page_count: usize,
    delay: Option<Duration>,
    unopenable: bool,
    /// Remaining failures per page
    failures: Mutex<HashMap<usize, usize>>,
    renders: Mutex<HashMap<usize, usize>>,
    scales: Mutex<Vec<(usize, f32)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedBackend {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            ..Self::default()
        }
    }

    /// Fail the next `times` renders of `page`
    pub fn failing(self, page: usize, times: usize) -> Self {
        lock(&self.failures).insert(page, times);
        self
    }

    /// Fail every render of `page`
    pub fn always_failing(self, page: usize) -> Self {
        self.failing(page, usize::MAX)
    }

    /// Sleep before every render
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject every document on open
    pub fn unopenable(mut self) -> Self {
        self.unopenable = true;
        self
    }

    /// A document this backend accepts
    pub fn document(&self) -> DocumentHandle {
        DocumentHandle::from_bytes(
            format!("scripted-{}.pdf", self.page_count),
            format!("scripted {}", self.page_count).into_bytes(),
        )
    }

    /// Renders attempted for `page`, failed ones included
    pub fn render_count(&self, page: usize) -> usize {
        lock(&self.renders).get(&page).copied().unwrap_or(0)
    }

    pub fn total_renders(&self) -> usize {
        lock(&self.renders).values().sum()
    }

    /// Scales requested for `page`, in call order
    pub fn scales_for(&self, page: usize) -> Vec<f32> {
        lock(&self.scales)
            .iter()
            .filter(|(p, _)| *p == page)
            .map(|(_, scale)| *scale)
            .collect()
    }
}

impl RenderBackend for ScriptedBackend {
    fn open(&self, document: &DocumentHandle) -> Result<usize, LoadFailure> {
        if document.is_empty() {
            return Err(LoadFailure::EmptyDocument);
        }
        if self.unopenable {
            return Err(LoadFailure::open("scripted open failure"));
        }
        if self.page_count == 0 {
            return Err(LoadFailure::NoPages);
        }
        Ok(self.page_count)
    }

    fn render(
        &self,
        _document: &DocumentHandle,
        page: usize,
        params: &RenderParams,
    ) -> Result<Bitmap, RenderFailure> {
        *lock(&self.renders).entry(page).or_insert(0) += 1;
        lock(&self.scales).push((page, params.scale));

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        {
            let mut failures = lock(&self.failures);
            if let Some(remaining) = failures.get_mut(&page) {
                if *remaining > 0 {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    return Err(RenderFailure::new(page, "scripted render failure"));
                }
            }
        }

        if page == 0 || page > self.page_count {
            return Err(RenderFailure::new(page, "page out of range"));
        }
        let (width, height) = page_pixels(params.scale);
        Ok(Bitmap::filled(width, height, (page as u8, 0, 0)))
    }
}
