//! Render backend boundary
//!
//! The backend turns a document and a page number into a bitmap. It is
//! called from worker threads, one page per call, and may be slow or fail.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::{LoadFailure, RenderFailure};
use super::request::RenderParams;
use super::types::Bitmap;

/// Content hash identifying a document across sessions
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Hash raw document bytes
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", md5::compute(bytes)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a loaded document's source bytes. Cheap to clone.
#[derive(Clone)]
pub struct DocumentHandle {
    id: DocumentId,
    name: Arc<str>,
    bytes: Arc<[u8]>,
}

impl DocumentHandle {
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let id = DocumentId::of_bytes(&bytes);
        Self {
            id,
            name: Arc::from(name.into()),
            bytes: Arc::from(bytes),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Document parsing and rasterization engine
pub trait RenderBackend: Send + Sync {
    /// Open a document and report its page count
    fn open(&self, document: &DocumentHandle) -> Result<usize, LoadFailure>;

    /// Rasterize one 1-based page
    fn render(
        &self,
        document: &DocumentHandle,
        page: usize,
        params: &RenderParams,
    ) -> Result<Bitmap, RenderFailure>;
}

/// Backend for generated documents: no parsing, pages are flat shaded
/// rectangles. Used by the CLI when no PDF engine is compiled in.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyntheticBackend;

impl SyntheticBackend {
    const MAGIC: &'static str = "%synthetic-pages ";
    /// Page size in points at scale 1.0
    pub const PAGE_SIZE: (f32, f32) = (60.0, 80.0);

    /// A document handle for a generated document of `page_count` pages
    #[must_use]
    pub fn document(page_count: usize) -> DocumentHandle {
        DocumentHandle::from_bytes(
            format!("synthetic-{page_count}"),
            format!("{}{page_count}", Self::MAGIC).into_bytes(),
        )
    }

    fn page_count(document: &DocumentHandle) -> Result<usize, LoadFailure> {
        let text = std::str::from_utf8(document.bytes())
            .map_err(|_| LoadFailure::open("not a synthetic document"))?;
        let count = text
            .strip_prefix(Self::MAGIC)
            .ok_or_else(|| LoadFailure::open("not a synthetic document"))?;
        count
            .trim()
            .parse::<usize>()
            .map_err(|e| LoadFailure::open(format!("bad page count: {e}")))
    }
}

impl RenderBackend for SyntheticBackend {
    fn open(&self, document: &DocumentHandle) -> Result<usize, LoadFailure> {
        if document.is_empty() {
            return Err(LoadFailure::EmptyDocument);
        }
        match Self::page_count(document)? {
            0 => Err(LoadFailure::NoPages),
            n => Ok(n),
        }
    }

    fn render(
        &self,
        document: &DocumentHandle,
        page: usize,
        params: &RenderParams,
    ) -> Result<Bitmap, RenderFailure> {
        let count = Self::page_count(document).map_err(|e| RenderFailure::new(page, e.to_string()))?;
        if page == 0 || page > count {
            return Err(RenderFailure::new(page, format!("out of range 1..={count}")));
        }
        let width = (Self::PAGE_SIZE.0 * params.scale).round().max(1.0) as u32;
        let height = (Self::PAGE_SIZE.1 * params.scale).round().max(1.0) as u32;
        let shade = 128 + (page % 128) as u8;
        Ok(Bitmap::filled(width, height, (shade, shade, 255 - shade)))
    }
}
