//! Render request and response types

use super::backend::DocumentHandle;
use super::error::RenderFailure;
use super::scheduler::Tier;
use super::types::Bitmap;

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Cache generation a request was issued in. Bumped by every cache clear,
/// so completions from before a zoom change or reset can be recognised.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Parameters for rendering a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParams {
    /// Rasterization scale (base scale times zoom)
    pub scale: f32,
    /// Encoding quality in (0, 1]
    pub quality: f32,
}

impl RenderParams {
    /// Scale in thousandths, stable enough to key persisted pages
    #[must_use]
    pub fn scale_millis(&self) -> u32 {
        (self.scale * 1_000.0).round() as u32
    }
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Render a page
    Page {
        id: RequestId,
        generation: Generation,
        tier: Tier,
        document: DocumentHandle,
        page: usize,
        params: RenderParams,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderResponse {
    /// Rendered page data
    Page {
        id: RequestId,
        generation: Generation,
        page: usize,
        data: Bitmap,
    },

    /// Error during rendering
    Error {
        id: RequestId,
        generation: Generation,
        error: RenderFailure,
    },
}

impl RenderResponse {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Page { id, .. } | Self::Error { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        match self {
            Self::Page { generation, .. } | Self::Error { generation, .. } => *generation,
        }
    }

    #[must_use]
    pub fn page(&self) -> usize {
        match self {
            Self::Page { page, .. } => *page,
            Self::Error { error, .. } => error.page,
        }
    }
}
