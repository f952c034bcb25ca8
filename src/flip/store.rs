//! Persistence boundary for documents and rendered pages
//!
//! Stores are byte-capacity bounded. A write that would push the store past
//! its ceiling fails with [`StoreError::CapacityExceeded`] and changes
//! nothing; callers treat that as a logged, non-fatal skip.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::backend::DocumentId;
use super::error::StoreError;
use super::types::Bitmap;

/// Default byte ceiling for a store
pub const DEFAULT_CAPACITY_BYTES: usize = 5 * 1024 * 1024;

const MANIFEST_FILENAME: &str = "manifest.json";

/// What a stored blob is
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Raw document bytes
    Document(DocumentId),
    /// One rendered page, encoded as JPEG
    Page {
        document: DocumentId,
        page: usize,
        scale_millis: u32,
    },
}

impl StoreKey {
    #[must_use]
    pub fn document(&self) -> &DocumentId {
        match self {
            Self::Document(id) | Self::Page { document: id, .. } => id,
        }
    }

    /// File name used by [`DiskStore`]
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::Document(id) => format!("doc-{id}.bin"),
            Self::Page {
                document,
                page,
                scale_millis,
            } => format!("page-{document}-{page}-{scale_millis}.jpg"),
        }
    }
}

/// Metadata of the last document written to a store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDocument {
    pub id: DocumentId,
    pub name: String,
    pub page_count: usize,
    pub saved_at: DateTime<Utc>,
}

/// Byte-capacity bounded key/value store
pub trait PageStore: Send {
    /// Write a blob. Fails without side effects past the capacity ceiling.
    fn put(&mut self, key: &StoreKey, bytes: &[u8]) -> Result<(), StoreError>;

    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Drop a document's bytes and every page stored for it
    fn remove_document(&mut self, document: &DocumentId) -> Result<(), StoreError>;

    /// The document to reopen on restore, if any
    fn last_document(&self) -> Option<SavedDocument>;

    fn set_last_document(&mut self, saved: Option<SavedDocument>) -> Result<(), StoreError>;

    fn used_bytes(&self) -> usize;

    fn capacity_bytes(&self) -> usize;
}

fn check_capacity(used: usize, replaced: usize, incoming: usize, limit: usize) -> Result<(), StoreError> {
    let needed = used - replaced + incoming;
    if needed > limit {
        return Err(StoreError::CapacityExceeded { needed, limit });
    }
    Ok(())
}

/// In-memory store
#[derive(Debug)]
pub struct MemoryStore {
    entries: HashMap<StoreKey, Vec<u8>>,
    last_document: Option<SavedDocument>,
    used: usize,
    capacity: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            last_document: None,
            used: 0,
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES)
    }
}

impl PageStore for MemoryStore {
    fn put(&mut self, key: &StoreKey, bytes: &[u8]) -> Result<(), StoreError> {
        let replaced = self.entries.get(key).map_or(0, Vec::len);
        check_capacity(self.used, replaced, bytes.len(), self.capacity)?;
        self.used = self.used - replaced + bytes.len();
        self.entries.insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn remove_document(&mut self, document: &DocumentId) -> Result<(), StoreError> {
        let mut freed = 0;
        self.entries.retain(|key, bytes| {
            let keep = key.document() != document;
            if !keep {
                freed += bytes.len();
            }
            keep
        });
        self.used -= freed;
        if self
            .last_document
            .as_ref()
            .is_some_and(|saved| saved.id == *document)
        {
            self.last_document = None;
        }
        Ok(())
    }

    fn last_document(&self) -> Option<SavedDocument> {
        self.last_document.clone()
    }

    fn set_last_document(&mut self, saved: Option<SavedDocument>) -> Result<(), StoreError> {
        self.last_document = saved;
        Ok(())
    }

    fn used_bytes(&self) -> usize {
        self.used
    }

    fn capacity_bytes(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    last_document: Option<SavedDocument>,
    /// File name -> size in bytes
    #[serde(default)]
    entries: BTreeMap<String, usize>,
}

/// Store backed by a directory, with a JSON manifest tracking sizes
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    manifest: Manifest,
    capacity: usize,
}

impl DiskStore {
    /// Open (or create) a store directory
    pub fn open(dir: impl Into<PathBuf>, capacity: usize) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory: {dir:?}"))?;

        let manifest_path = dir.join(MANIFEST_FILENAME);
        let manifest = if manifest_path.exists() {
            let content = fs::read_to_string(&manifest_path)
                .with_context(|| format!("Failed to read store manifest: {manifest_path:?}"))?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Discarding unreadable store manifest {manifest_path:?}: {e}");
                Manifest::default()
            })
        } else {
            Manifest::default()
        };

        debug!(
            "Opened page store {dir:?} with {} entries",
            manifest.entries.len()
        );

        Ok(Self {
            dir,
            manifest,
            capacity,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save_manifest(&self) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(self.dir.join(MANIFEST_FILENAME), content)?;
        Ok(())
    }
}

impl PageStore for DiskStore {
    fn put(&mut self, key: &StoreKey, bytes: &[u8]) -> Result<(), StoreError> {
        let name = key.file_name();
        let replaced = self.manifest.entries.get(&name).copied().unwrap_or(0);
        check_capacity(self.used_bytes(), replaced, bytes.len(), self.capacity)?;

        fs::write(self.dir.join(&name), bytes)?;
        self.manifest.entries.insert(name, bytes.len());
        self.save_manifest()
    }

    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        let name = key.file_name();
        if !self.manifest.entries.contains_key(&name) {
            return Ok(None);
        }
        match fs::read(self.dir.join(&name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_document(&mut self, document: &DocumentId) -> Result<(), StoreError> {
        let doc_file = StoreKey::Document(document.clone()).file_name();
        let page_prefix = format!("page-{document}-");
        let doomed: Vec<String> = self
            .manifest
            .entries
            .keys()
            .filter(|name| **name == doc_file || name.starts_with(&page_prefix))
            .cloned()
            .collect();

        for name in doomed {
            match fs::remove_file(self.dir.join(&name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.manifest.entries.remove(&name);
        }

        if self
            .manifest
            .last_document
            .as_ref()
            .is_some_and(|saved| saved.id == *document)
        {
            self.manifest.last_document = None;
        }
        self.save_manifest()
    }

    fn last_document(&self) -> Option<SavedDocument> {
        self.manifest.last_document.clone()
    }

    fn set_last_document(&mut self, saved: Option<SavedDocument>) -> Result<(), StoreError> {
        self.manifest.last_document = saved;
        self.save_manifest()
    }

    fn used_bytes(&self) -> usize {
        self.manifest.entries.values().sum()
    }

    fn capacity_bytes(&self) -> usize {
        self.capacity
    }
}

/// Encode a rendered page as JPEG at `quality` in (0, 1]
pub fn encode_page(bitmap: &Bitmap, quality: f32) -> Result<Vec<u8>, StoreError> {
    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        &bitmap.pixels,
        bitmap.width_px,
        bitmap.height_px,
        ExtendedColorType::Rgb8,
    )?;
    Ok(out.into_inner())
}

/// Decode a page written by [`encode_page`]
pub fn decode_page(bytes: &[u8]) -> Result<Bitmap, StoreError> {
    let rgb = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Bitmap::new(width, height, rgb.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_id(seed: &str) -> DocumentId {
        DocumentId::of_bytes(seed.as_bytes())
    }

    fn page_key(seed: &str, page: usize) -> StoreKey {
        StoreKey::Page {
            document: doc_id(seed),
            page,
            scale_millis: 1500,
        }
    }

    #[test]
    fn memory_store_round_trip() {
        let mut store = MemoryStore::new(100);
        store.put(&page_key("a", 1), b"abc").unwrap();
        assert_eq!(store.get(&page_key("a", 1)).unwrap(), Some(b"abc".to_vec()));
        assert_eq!(store.get(&page_key("a", 2)).unwrap(), None);
        assert_eq!(store.used_bytes(), 3);
    }

    #[test]
    fn memory_store_skips_writes_past_capacity() {
        let mut store = MemoryStore::new(10);
        store.put(&page_key("a", 1), &[0; 8]).unwrap();
        let err = store.put(&page_key("a", 2), &[0; 8]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::CapacityExceeded {
                needed: 16,
                limit: 10
            }
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.used_bytes(), 8);

        // Overwriting counts only the difference
        store.put(&page_key("a", 1), &[0; 10]).unwrap();
        assert_eq!(store.used_bytes(), 10);
    }

    #[test]
    fn memory_store_removes_whole_document() {
        let mut store = MemoryStore::new(1_000);
        store.put(&StoreKey::Document(doc_id("a")), b"doc").unwrap();
        store.put(&page_key("a", 1), b"p1").unwrap();
        store.put(&page_key("b", 1), b"p1").unwrap();
        store
            .set_last_document(Some(SavedDocument {
                id: doc_id("a"),
                name: "a.pdf".into(),
                page_count: 3,
                saved_at: Utc::now(),
            }))
            .unwrap();

        store.remove_document(&doc_id("a")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.used_bytes(), 2);
        assert!(store.last_document().is_none());
    }

    #[test]
    fn disk_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = DiskStore::open(dir.path(), 1_000).unwrap();
            store.put(&StoreKey::Document(doc_id("a")), b"bytes").unwrap();
            store
                .set_last_document(Some(SavedDocument {
                    id: doc_id("a"),
                    name: "a.pdf".into(),
                    page_count: 7,
                    saved_at: Utc::now(),
                }))
                .unwrap();
        }

        let store = DiskStore::open(dir.path(), 1_000).unwrap();
        assert_eq!(
            store.get(&StoreKey::Document(doc_id("a"))).unwrap(),
            Some(b"bytes".to_vec())
        );
        assert_eq!(store.used_bytes(), 5);
        assert_eq!(store.last_document().map(|d| d.page_count), Some(7));
    }

    #[test]
    fn disk_store_capacity_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DiskStore::open(dir.path(), 6).unwrap();
        store.put(&page_key("a", 1), b"1234").unwrap();
        assert!(matches!(
            store.put(&page_key("a", 2), b"1234"),
            Err(StoreError::CapacityExceeded { .. })
        ));
        assert!(!dir.path().join(page_key("a", 2).file_name()).exists());

        store.remove_document(&doc_id("a")).unwrap();
        assert_eq!(store.used_bytes(), 0);
        assert!(!dir.path().join(page_key("a", 1).file_name()).exists());
    }

    #[test]
    fn page_jpeg_keeps_dimensions() {
        let bitmap = Bitmap::filled(16, 8, (200, 40, 40));
        let bytes = encode_page(&bitmap, 0.5).unwrap();
        let decoded = decode_page(&bytes).unwrap();
        assert_eq!((decoded.width_px, decoded.height_px), (16, 8));
        assert!(decoded.is_consistent());
    }
}
