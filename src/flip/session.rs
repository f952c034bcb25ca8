//! Document session - owns the page cache, in-flight renders and worker pool
//!
//! All cache and in-flight bookkeeping happens on the thread that owns the
//! session. Workers only rasterize; their results come back as discrete
//! responses that the session applies one at a time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use flume::{Receiver, Sender, TryRecvError};
use log::{debug, error, info, warn};

use super::backend::{DocumentHandle, RenderBackend};
use super::cache::PageCache;
use super::error::{SessionError, StoreError};
use super::eviction::select_victims;
use super::request::{Generation, RenderParams, RenderRequest, RenderResponse, RequestId};
use super::scheduler::{self, PrefetchPlan, Tier};
use super::sizing::SizingPolicy;
use super::state::{Command, Effect, Position, SessionPhase, SessionState};
use super::store::{self, PageStore, SavedDocument, StoreKey};
use super::types::Bitmap;
use super::viewer::{PageSlot, Spread, ViewerAdapter, build_spreads};
use super::zoom::Zoom;
use super::DEFAULT_WORKERS;

/// Construction-time knobs for a session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    /// Render worker threads
    pub workers: usize,
    /// Rasterization scale at 100% zoom
    pub base_scale: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            base_scale: Zoom::BASE_SCALE,
        }
    }
}

/// Snapshot of session bookkeeping, for status displays
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionStats {
    pub phase: SessionPhase,
    pub page_count: usize,
    pub cached_pages: usize,
    pub buffer_size: usize,
    pub in_flight: usize,
    pub failed_pages: usize,
    pub quality: f32,
    pub zoom_percent: u32,
    pub cached_bytes: usize,
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    id: RequestId,
    tier: Tier,
}

/// One viewer session over one document at a time
pub struct Session {
    state: SessionState,
    document: Option<DocumentHandle>,
    backend: Arc<dyn RenderBackend>,
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    num_workers: usize,
    next_request_id: u64,
    generation: Generation,
    cache: PageCache,
    in_flight: HashMap<usize, InFlight>,
    /// Visible pages whose last render failed
    failed: HashSet<usize>,
    store: Option<Box<dyn PageStore>>,
    /// Cleared when the current document could not be saved
    persist_pages: bool,
}

impl Session {
    /// Create a session with default configuration
    #[must_use]
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self::with_config(backend, SessionConfig::default())
    }

    /// Create a session with custom configuration
    #[must_use]
    pub fn with_config(backend: Arc<dyn RenderBackend>, config: SessionConfig) -> Self {
        // flume gives us MPMC: every worker pulls from the same request queue.
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let num_workers = config.workers.max(1);
        for _ in 0..num_workers {
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let backend = Arc::clone(&backend);

            std::thread::spawn(move || {
                super::worker::render_worker(backend, rx, tx);
            });
        }

        Self {
            state: SessionState::new(config.base_scale),
            document: None,
            backend,
            request_tx,
            response_rx,
            num_workers,
            next_request_id: 1,
            generation: Generation::default(),
            cache: PageCache::new(),
            in_flight: HashMap::new(),
            failed: HashSet::new(),
            store: None,
            persist_pages: true,
        }
    }

    /// Attach a persistence store for documents and rendered pages
    #[must_use]
    pub fn with_store(mut self, store: Box<dyn PageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Open a document, render its initial burst and schedule the first spread.
    ///
    /// On failure the session is back in `Empty`.
    pub fn load(&mut self, document: DocumentHandle) -> Result<(), SessionError> {
        info!(
            "Loading document {:?} ({} bytes)",
            document.name(),
            document.len()
        );
        self.apply_command(Command::BeginLoad);
        self.document = Some(document.clone());

        let page_count = match self.backend.open(&document) {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to open document {:?}: {e}", document.name());
                self.apply_command(Command::LoadFailed);
                return Err(e.into());
            }
        };

        info!("Document has {page_count} pages");
        self.apply_command(Command::PageCountKnown(page_count));
        if let Some(sizing) = self.state.sizing {
            info!(
                "Using buffer {} / burst {} / quality {:.2}",
                sizing.buffer_size, sizing.initial_burst, sizing.quality
            );
        }
        self.apply_command(Command::LoadSucceeded);
        Ok(())
    }

    /// Reopen the document saved in the attached store
    pub fn restore(&mut self) -> Result<(), SessionError> {
        let store = self.store.as_ref().ok_or(SessionError::NothingToRestore)?;
        let saved = store.last_document().ok_or(SessionError::NothingToRestore)?;

        match store.get(&StoreKey::Document(saved.id.clone()))? {
            Some(bytes) => {
                info!("Restoring saved document {:?}", saved.name);
                self.load(DocumentHandle::from_bytes(saved.name, bytes))
            }
            None => {
                warn!("Saved document {:?} has no stored bytes", saved.name);
                Err(SessionError::NothingToRestore)
            }
        }
    }

    /// Drop the document, its renders and its persisted copy
    pub fn reset(&mut self) {
        info!("Resetting session");
        self.apply_command(Command::Reset);
    }

    /// The viewer moved to another spread
    pub fn on_position_changed(&mut self, spread: usize) {
        self.apply_command(Command::GoToSpread(spread));
    }

    /// Move to a 0-based page index
    pub fn go_to_index(&mut self, index: usize) {
        self.apply_command(Command::GoToIndex(index));
    }

    /// Set the zoom factor; clears the cache if it changes
    pub fn on_zoom_changed(&mut self, factor: f32) {
        self.apply_command(Command::SetZoom(factor));
    }

    pub fn zoom_in(&mut self) {
        self.apply_command(Command::ZoomIn);
    }

    pub fn zoom_out(&mut self) {
        self.apply_command(Command::ZoomOut);
    }

    pub fn reset_zoom(&mut self) {
        self.apply_command(Command::ResetZoom);
    }

    /// Apply a command to the session state
    pub fn apply_command(&mut self, cmd: Command) {
        let effects = self.state.apply(cmd);
        self.execute_effects(effects);
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ClearCache => self.clear(),

                Effect::ReleaseDocument => {
                    if let Some(doc) = self.document.take() {
                        self.drop_unsaved_pages(&doc);
                        debug!("Released document {:?}", doc.name());
                    }
                    self.persist_pages = true;
                }

                Effect::ForgetSavedDocument => self.forget_saved_document(),

                Effect::PersistDocument => self.persist_document(),

                Effect::RenderInitialBurst => self.render_initial_burst(),

                Effect::Schedule => {
                    self.schedule();
                }
            }
        }
    }

    /// Release every cached rendering and forget in-flight renders.
    ///
    /// Renders already running finish on their worker, but their results
    /// belong to an older generation and are dropped on arrival.
    pub fn clear(&mut self) {
        if self.cache.is_empty() && self.in_flight.is_empty() && self.failed.is_empty() {
            return;
        }
        debug!(
            "Clearing {} cached and {} in-flight pages",
            self.cache.size(),
            self.in_flight.len()
        );
        self.cache.clear();
        self.in_flight.clear();
        self.failed.clear();
        self.generation = self.generation.next();
    }

    /// Plan renders for the current position, wait for the visible spread
    /// and dispatch the prefetch tiers without waiting.
    pub fn schedule(&mut self) -> PrefetchPlan {
        if self.state.phase != SessionPhase::Ready {
            return PrefetchPlan::default();
        }
        let position = self.state.position;
        let plan = scheduler::schedule(position.index, self.state.page_count, position.direction);
        debug!(
            "Schedule at index {} ({:?}): visible {:?}, next {:?}, previous {:?}",
            position.index, position.direction, plan.visible, plan.next, plan.previous
        );

        for &page in &plan.visible {
            self.request_page_if_needed(page, Tier::Visible);
        }
        self.await_pages(&plan.visible);

        for (page, tier) in plan.ordered() {
            if tier != Tier::Visible {
                self.request_page_if_needed(page, tier);
            }
        }
        // Store hits land in the cache without a completion
        self.evict();

        plan
    }

    /// Apply every completion already delivered, without blocking.
    /// Returns the number of completions applied.
    pub fn poll_responses(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.response_rx.try_recv() {
                Ok(response) => {
                    self.on_render_complete(response);
                    applied += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if applied > 0 {
            self.evict();
        }
        applied
    }

    /// Block until nothing is in flight
    pub fn settle(&mut self) {
        let pending: Vec<usize> = self.in_flight.keys().copied().collect();
        self.await_pages(&pending);
        self.poll_responses();
    }

    /// Request a page unless it is cached, already in flight or persisted.
    pub fn request_page_if_needed(&mut self, page: usize, tier: Tier) -> Option<RequestId> {
        if self.cache.contains(page) || self.in_flight.contains_key(&page) {
            return None;
        }
        if page == 0 || page > self.state.page_count {
            return None;
        }
        if let Some(bitmap) = self.load_persisted_page(page) {
            self.cache.put(page, bitmap);
            self.failed.remove(&page);
            return None;
        }

        let (document, params) = match (&self.document, self.state.render_params()) {
            (Some(doc), Some(params)) => (doc.clone(), params),
            _ => return None,
        };

        let id = self.next_id();
        let request = RenderRequest::Page {
            id,
            generation: self.generation,
            tier,
            document,
            page,
            params,
        };
        if self.request_tx.send(request).is_err() {
            error!("Render workers are gone; cannot render page {page}");
            return None;
        }
        self.in_flight.insert(page, InFlight { id, tier });
        Some(id)
    }

    fn render_initial_burst(&mut self) {
        let Some(sizing) = self.state.sizing else {
            return;
        };
        let burst: Vec<usize> = (1..=sizing.initial_burst.min(self.state.page_count)).collect();
        for &page in &burst {
            self.request_page_if_needed(page, Tier::Visible);
        }

        let total = burst.len().max(1);
        while let Some(done) = self.wait_for_one(&burst) {
            let settled = burst.len() - done;
            let progress = u8::try_from(settled * 100 / total).unwrap_or(100);
            self.apply_command(Command::LoadProgress(progress));
            debug!("Initial burst {progress}%");
        }
        self.evict();
    }

    /// Block until every page in `pages` has left the in-flight set
    fn await_pages(&mut self, pages: &[usize]) {
        while self.wait_for_one(pages).is_some() {}
        self.evict();
    }

    /// Apply the next completion if any of `pages` is still in flight.
    /// Returns how many of them remain in flight afterwards, or `None`
    /// once none were pending.
    fn wait_for_one(&mut self, pages: &[usize]) -> Option<usize> {
        let pending = |s: &Self| pages.iter().filter(|p| s.in_flight.contains_key(p)).count();
        if pending(self) == 0 {
            return None;
        }

        match self.response_rx.recv() {
            Ok(response) => {
                self.on_render_complete(response);
                while let Ok(response) = self.response_rx.try_recv() {
                    self.on_render_complete(response);
                }
            }
            Err(_) => {
                error!("Render workers are gone; giving up on {pages:?}");
                for page in pages {
                    if self.in_flight.remove(page).is_some() {
                        self.record_failure(*page);
                    }
                }
            }
        }
        Some(pending(self))
    }

    /// Apply one worker completion. Stale or unexpected completions are dropped.
    pub fn on_render_complete(&mut self, response: RenderResponse) {
        if response.generation() != self.generation {
            debug!(
                "Dropping stale render of page {} from {:?}",
                response.page(),
                response.generation()
            );
            return;
        }

        let page = response.page();
        let tier = match self.in_flight.get(&page) {
            Some(entry) if entry.id == response.id() => entry.tier,
            _ => {
                debug!("Dropping unexpected render of page {page}");
                return;
            }
        };
        self.in_flight.remove(&page);

        match response {
            RenderResponse::Page { data, .. } => {
                self.persist_page(page, &data);
                self.cache.put(page, data);
                self.failed.remove(&page);
            }
            RenderResponse::Error { error, .. } => {
                if self.visible_pages().contains(&page) {
                    warn!("Visible page {page} failed to render: {}", error.cause);
                    self.failed.insert(page);
                } else {
                    warn!("Dropping failed render of page {page} ({tier:?}): {}", error.cause);
                }
            }
        }
    }

    fn record_failure(&mut self, page: usize) {
        if self.visible_pages().contains(&page) {
            self.failed.insert(page);
        }
    }

    /// Trim the cache to the bucket's buffer size
    fn evict(&mut self) {
        let Some(sizing) = self.state.sizing else {
            return;
        };
        if self.cache.size() <= sizing.buffer_size {
            return;
        }

        let position = self.state.position;
        let victims = select_victims(
            &self.cache.pages(),
            sizing.buffer_size,
            position.page(),
            position.direction,
            &self.visible_pages(),
        );
        for page in &victims {
            self.cache.remove(*page);
        }
        debug!(
            "Evicted pages {victims:?}, {} remain",
            self.cache.size()
        );
    }

    fn persist_document(&mut self) {
        let (Some(store), Some(doc)) = (self.store.as_mut(), self.document.as_ref()) else {
            return;
        };

        // The store keeps a single document; make room for this one.
        if let Some(previous) = store.last_document().filter(|saved| saved.id != *doc.id()) {
            if let Err(e) = store.remove_document(&previous.id) {
                warn!("Failed to remove previously saved document: {e}");
            }
        }

        match store.put(&StoreKey::Document(doc.id().clone()), doc.bytes()) {
            Ok(()) => {
                let saved = SavedDocument {
                    id: doc.id().clone(),
                    name: doc.name().to_string(),
                    page_count: self.state.page_count,
                    saved_at: Utc::now(),
                };
                if let Err(e) = store.set_last_document(Some(saved)) {
                    warn!("Failed to record saved document: {e}");
                }
            }
            Err(StoreError::CapacityExceeded { needed, limit }) => {
                warn!(
                    "Document too large to persist ({needed} > {limit} bytes); keeping this session in memory only"
                );
                self.stop_persisting_pages();
            }
            Err(e) => {
                warn!("Failed to persist document: {e}");
                self.stop_persisting_pages();
            }
        }
    }

    /// Pages of a document that was never saved cannot be restored
    fn stop_persisting_pages(&mut self) {
        self.persist_pages = false;
        let (Some(store), Some(doc)) = (self.store.as_mut(), self.document.as_ref()) else {
            return;
        };
        if let Err(e) = store.remove_document(doc.id()) {
            warn!("Failed to remove pages of unsaved document: {e}");
        }
    }

    fn drop_unsaved_pages(&mut self, doc: &DocumentHandle) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        if store.last_document().is_some_and(|saved| saved.id == *doc.id()) {
            return;
        }
        if let Err(e) = store.remove_document(doc.id()) {
            warn!("Failed to remove pages of {:?}: {e}", doc.name());
        }
    }

    fn forget_saved_document(&mut self) {
        let (Some(store), Some(doc)) = (self.store.as_mut(), self.document.as_ref()) else {
            return;
        };
        if let Err(e) = store.remove_document(doc.id()) {
            warn!("Failed to remove saved document: {e}");
        }
    }

    fn page_key(&self, page: usize, params: &RenderParams) -> Option<StoreKey> {
        self.document.as_ref().map(|doc| StoreKey::Page {
            document: doc.id().clone(),
            page,
            scale_millis: params.scale_millis(),
        })
    }

    fn persist_page(&mut self, page: usize, bitmap: &Bitmap) {
        if self.store.is_none() || !self.persist_pages {
            return;
        }
        let Some(params) = self.state.render_params() else {
            return;
        };
        let Some(key) = self.page_key(page, &params) else {
            return;
        };
        let Some(store) = self.store.as_mut() else {
            return;
        };

        let result = store::encode_page(bitmap, params.quality).and_then(|bytes| store.put(&key, &bytes));
        match result {
            Ok(()) => {}
            Err(StoreError::CapacityExceeded { .. }) => {
                debug!("Store full, page {page} kept in memory only");
            }
            Err(e) => warn!("Failed to persist page {page}: {e}"),
        }
    }

    fn load_persisted_page(&self, page: usize) -> Option<Bitmap> {
        let store = self.store.as_ref()?;
        let params = self.state.render_params()?;
        let key = self.page_key(page, &params)?;

        let bytes = match store.get(&key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!("Failed to read persisted page {page}: {e}");
                return None;
            }
        };
        match store::decode_page(&bytes) {
            Ok(bitmap) => {
                debug!("Page {page} restored from store");
                Some(bitmap)
            }
            Err(e) => {
                warn!("Discarding unreadable persisted page {page}: {e}");
                None
            }
        }
    }

    fn visible_pages(&self) -> Vec<usize> {
        scheduler::current_spread(self.state.position.index, self.state.page_count)
    }

    /// Every spread of the document, with slots filled near the current one
    #[must_use]
    pub fn spreads(&self) -> Vec<Spread> {
        build_spreads(
            self.state.page_count,
            self.state.position.index,
            |page, visible| match self.cache.get(page) {
                Some(bitmap) => PageSlot::Ready(bitmap),
                None if !visible => PageSlot::Empty,
                None if self.failed.contains(&page) && !self.is_in_flight(page) => {
                    PageSlot::Failed
                }
                None => PageSlot::Loading,
            },
        )
    }

    /// Hand the current renderable set to a viewer
    pub fn present(&self, viewer: &mut dyn ViewerAdapter) {
        viewer.present(&self.spreads(), self.state.position.spread());
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let sizing = self.state.sizing;
        SessionStats {
            phase: self.state.phase,
            page_count: self.state.page_count,
            cached_pages: self.cache.size(),
            buffer_size: sizing.map_or(0, |s| s.buffer_size),
            in_flight: self.in_flight.len(),
            failed_pages: self.failed.len(),
            quality: sizing.map_or(0.0, |s| s.quality),
            zoom_percent: self.state.zoom.percent(),
            cached_bytes: self.cache.byte_size(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.page_count
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.state.position
    }

    #[must_use]
    pub fn sizing(&self) -> Option<SizingPolicy> {
        self.state.sizing
    }

    #[must_use]
    pub fn zoom(&self) -> Zoom {
        self.state.zoom
    }

    #[must_use]
    pub fn document(&self) -> Option<&DocumentHandle> {
        self.document.as_ref()
    }

    #[must_use]
    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    #[must_use]
    pub fn is_in_flight(&self, page: usize) -> bool {
        self.in_flight.contains_key(&page)
    }

    #[must_use]
    pub fn in_flight_pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.in_flight.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    #[must_use]
    pub fn failed_pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.failed.iter().copied().collect();
        pages.sort_unstable();
        pages
    }

    #[must_use]
    pub fn store(&self) -> Option<&dyn PageStore> {
        self.store.as_deref()
    }

    /// Shutdown all workers
    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            if self.request_tx.send(RenderRequest::Shutdown).is_err() {
                debug!("Render workers already stopped");
                break;
            }
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.clear();
        self.shutdown();
    }
}
