//! Error taxonomy for document sessions

/// The document could not be opened. Fatal to the session, which returns to `Empty`.
#[derive(Debug, thiserror::Error)]
pub enum LoadFailure {
    #[error("document is empty")]
    EmptyDocument,

    #[error("document has no pages")]
    NoPages,

    #[error("cannot open document: {detail}")]
    Open { detail: String },
}

impl LoadFailure {
    pub fn open(msg: impl Into<String>) -> Self {
        Self::Open { detail: msg.into() }
    }
}

/// A single page could not be rasterized. Recoverable: the page stays absent
/// and is retried by the next schedule that covers it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("page {page}: {cause}")]
pub struct RenderFailure {
    pub page: usize,
    pub cause: String,
}

impl RenderFailure {
    pub fn new(page: usize, cause: impl Into<String>) -> Self {
        Self {
            page,
            cause: cause.into(),
        }
    }
}

/// Errors from the persistence boundary
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write would exceed the store's byte ceiling and was skipped.
    #[error("store capacity exceeded: {needed} bytes needed, limit is {limit}")]
    CapacityExceeded { needed: usize, limit: usize },

    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("store manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("page image: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors surfaced by session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadFailure),

    #[error("no saved document to restore")]
    NothingToRestore,

    #[error(transparent)]
    Store(#[from] StoreError),
}
