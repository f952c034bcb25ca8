//! MuPDF render backend
//!
//! Each worker thread keeps its own parsed copy of the current document,
//! since MuPDF documents cannot be shared across threads.

use std::cell::RefCell;

use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::backend::{DocumentHandle, DocumentId, RenderBackend};
use super::error::{LoadFailure, RenderFailure};
use super::request::RenderParams;
use super::types::Bitmap;

thread_local! {
    static OPEN_DOCUMENT: RefCell<Option<(DocumentId, Document)>> = const { RefCell::new(None) };
}

/// Rasterizes PDF pages with MuPDF
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    const MAGIC: &'static str = "application/pdf";

    fn parse(document: &DocumentHandle) -> Result<Document, mupdf::error::Error> {
        Document::from_bytes(document.bytes(), Self::MAGIC)
    }

    fn with_document<T>(
        document: &DocumentHandle,
        page: usize,
        f: impl FnOnce(&Document) -> Result<T, RenderFailure>,
    ) -> Result<T, RenderFailure> {
        OPEN_DOCUMENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            let stale = slot
                .as_ref()
                .is_none_or(|(id, _)| id != document.id());
            if stale {
                let doc = Self::parse(document).map_err(|e| RenderFailure::new(page, e.to_string()))?;
                *slot = Some((document.id().clone(), doc));
            }
            match slot.as_ref() {
                Some((_, doc)) => f(doc),
                None => Err(RenderFailure::new(page, "document not open")),
            }
        })
    }
}

impl RenderBackend for MupdfBackend {
    fn open(&self, document: &DocumentHandle) -> Result<usize, LoadFailure> {
        if document.is_empty() {
            return Err(LoadFailure::EmptyDocument);
        }
        let doc = Self::parse(document).map_err(|e| LoadFailure::open(e.to_string()))?;
        let count = doc
            .page_count()
            .map_err(|e| LoadFailure::open(e.to_string()))?;
        match usize::try_from(count) {
            Ok(0) | Err(_) => Err(LoadFailure::NoPages),
            Ok(n) => Ok(n),
        }
    }

    fn render(
        &self,
        document: &DocumentHandle,
        page: usize,
        params: &RenderParams,
    ) -> Result<Bitmap, RenderFailure> {
        Self::with_document(document, page, |doc| {
            let index = i32::try_from(page.saturating_sub(1))
                .map_err(|_| RenderFailure::new(page, "page index overflow"))?;
            let loaded = doc
                .load_page(index)
                .map_err(|e| RenderFailure::new(page, e.to_string()))?;
            let transform = Matrix::new_scale(params.scale, params.scale);
            let pixmap = loaded
                .to_pixmap(&transform, &Colorspace::device_rgb(), false, false)
                .map_err(|e| RenderFailure::new(page, e.to_string()))?;
            let pixels = pixmap_to_rgb(&pixmap).map_err(|detail| RenderFailure::new(page, detail))?;
            Ok(Bitmap::new(pixmap.width(), pixmap.height(), pixels))
        })
    }
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, String> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(format!("Unsupported pixmap format: {n} channels"));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err("Pixmap buffer size mismatch".to_string());
    }

    let mut out = Vec::with_capacity(width * height * Bitmap::CHANNELS);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        if n == Bitmap::CHANNELS {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..Bitmap::CHANNELS]);
            }
        }
    }

    Ok(out)
}
