//! Adaptive page cache and prefetch scheduling for flip-book viewers

mod backend;
mod cache;
mod error;
mod eviction;
#[cfg(feature = "pdf")]
mod mupdf_backend;
mod request;
mod scheduler;
mod session;
mod sizing;
mod state;
mod store;
mod types;
mod viewer;
mod worker;
mod zoom;

/// Render worker threads started by a default session
pub const DEFAULT_WORKERS: usize = 2;

pub use backend::{DocumentHandle, DocumentId, RenderBackend, SyntheticBackend};
pub use cache::PageCache;
pub use error::{LoadFailure, RenderFailure, SessionError, StoreError};
pub use eviction::{WRONG_SIDE_PENALTY, select_victims, weighted_distance};
#[cfg(feature = "pdf")]
pub use mupdf_backend::MupdfBackend;
pub use request::{Generation, RenderParams, RenderRequest, RenderResponse, RequestId};
pub use scheduler::{DIRECTIONAL_RUN, Direction, PrefetchPlan, Tier, current_spread, schedule};
pub use session::{Session, SessionConfig, SessionStats};
pub use sizing::{SizingPolicy, size};
pub use state::{Command, Effect, Position, SessionPhase, SessionState};
pub use store::{
    DEFAULT_CAPACITY_BYTES, DiskStore, MemoryStore, PageStore, SavedDocument, StoreKey,
    decode_page, encode_page,
};
pub use types::{Bitmap, spread_count, spread_of};
pub use viewer::{PageSlot, SPREAD_WINDOW, Spread, ViewerAdapter, build_spreads};
pub use worker::render_worker;
pub use zoom::Zoom;
