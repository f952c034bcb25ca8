use std::sync::Arc;

use pageflip::flip::{
    DiskStore, DocumentHandle, MemoryStore, PageStore, Session, SessionError, SessionPhase,
    StoreKey,
};
use pageflip::test_utils::ScriptedBackend;
use tempfile::TempDir;

#[test]
fn load_saves_document_metadata() {
    let backend = Arc::new(ScriptedBackend::new(20));
    let document = backend.document();
    let mut session =
        Session::new(backend.clone()).with_store(Box::new(MemoryStore::default()));
    session.load(document.clone()).unwrap();
    session.settle();

    let store = session.store().unwrap();
    let saved = store.last_document().unwrap();
    assert_eq!(saved.id, *document.id());
    assert_eq!(saved.name, document.name());
    assert_eq!(saved.page_count, 20);
    assert_eq!(
        store.get(&StoreKey::Document(document.id().clone())).unwrap(),
        Some(document.bytes().to_vec())
    );
    // Rendered pages were written too
    assert!(store.used_bytes() > document.len());
}

#[test]
fn restore_reopens_saved_document_without_rendering() {
    let dir = TempDir::new().unwrap();

    let first = Arc::new(ScriptedBackend::new(20));
    {
        let store = DiskStore::open(dir.path(), 1024 * 1024).unwrap();
        let mut session = Session::new(first.clone()).with_store(Box::new(store));
        session.load(first.document()).unwrap();
        session.settle();
    }
    assert!(first.total_renders() > 0);

    let second = Arc::new(ScriptedBackend::new(20));
    let store = DiskStore::open(dir.path(), 1024 * 1024).unwrap();
    let mut session = Session::new(second.clone()).with_store(Box::new(store));
    session.restore().unwrap();
    session.settle();

    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(session.page_count(), 20);
    assert!(session.cache().contains(1));
    assert_eq!(second.total_renders(), 0);
}

#[test]
fn restore_without_saved_document() {
    let backend = Arc::new(ScriptedBackend::new(20));

    let mut bare = Session::new(backend.clone());
    assert!(matches!(bare.restore(), Err(SessionError::NothingToRestore)));

    let mut session = Session::new(backend).with_store(Box::new(MemoryStore::default()));
    assert!(matches!(
        session.restore(),
        Err(SessionError::NothingToRestore)
    ));
    assert_eq!(session.phase(), SessionPhase::Empty);
}

#[test]
fn oversized_document_stays_in_memory() {
    let backend = Arc::new(ScriptedBackend::new(20));
    let mut session = Session::new(backend.clone()).with_store(Box::new(MemoryStore::new(4)));

    session.load(backend.document()).unwrap();
    session.settle();

    assert_eq!(session.phase(), SessionPhase::Ready);
    assert!(session.cache().contains(1));
    let store = session.store().unwrap();
    assert!(store.last_document().is_none());
    assert_eq!(store.used_bytes(), 0);
}

#[test]
fn reset_forgets_saved_document() {
    let backend = Arc::new(ScriptedBackend::new(20));
    let mut session =
        Session::new(backend.clone()).with_store(Box::new(MemoryStore::default()));
    session.load(backend.document()).unwrap();
    session.settle();
    assert!(session.store().unwrap().last_document().is_some());

    session.reset();
    let store = session.store().unwrap();
    assert!(store.last_document().is_none());
    assert_eq!(store.used_bytes(), 0);
    assert!(matches!(
        session.restore(),
        Err(SessionError::NothingToRestore)
    ));
}

#[test]
fn loading_another_document_replaces_saved_one() {
    let small = Arc::new(ScriptedBackend::new(20));
    let mut session =
        Session::new(small.clone()).with_store(Box::new(MemoryStore::default()));
    session.load(small.document()).unwrap();
    session.settle();
    let first_id = small.document().id().clone();

    let other = ScriptedBackend::new(30).document();
    session.load(other.clone()).unwrap();
    session.settle();

    let store = session.store().unwrap();
    assert_eq!(store.last_document().map(|d| d.id), Some(other.id().clone()));
    assert_eq!(store.get(&StoreKey::Document(first_id)).unwrap(), None);
}

#[test]
fn pages_restored_from_store_respect_buffer() {
    let backend = Arc::new(ScriptedBackend::new(600));
    let mut session = Session::new(backend.clone())
        .with_store(Box::new(MemoryStore::new(64 * 1024 * 1024)));
    session.load(backend.document()).unwrap();
    session.settle();

    session.zoom_in();
    session.settle();
    let renders = backend.total_renders();

    // Back at 100% every scheduled page is already in the store
    session.zoom_out();
    session.poll_responses();

    assert_eq!(backend.total_renders(), renders);
    assert!(session.in_flight_pages().is_empty());
    assert!(session.cache().size() <= 4, "cache: {:?}", session.cache().pages());
    assert!(session.cache().contains(1));
    assert!(session.cache().contains(2));
}

#[test]
fn unsaved_document_leaves_no_pages_behind() {
    let mut session = Session::new(Arc::new(ScriptedBackend::new(20)))
        .with_store(Box::new(MemoryStore::new(60 * 1024)));

    let big = DocumentHandle::from_bytes("big.pdf", vec![1u8; 100 * 1024]);
    session.load(big).unwrap();
    session.settle();
    session.on_position_changed(3);
    session.settle();

    let store = session.store().unwrap();
    assert!(store.last_document().is_none());
    assert_eq!(store.used_bytes(), 0);

    let small = ScriptedBackend::new(20).document();
    session.load(small.clone()).unwrap();
    session.settle();
    let used_with_small = session.store().unwrap().used_bytes();

    let mut fresh = Session::new(Arc::new(ScriptedBackend::new(20)))
        .with_store(Box::new(MemoryStore::new(60 * 1024)));
    fresh.load(small.clone()).unwrap();
    fresh.settle();

    let store = session.store().unwrap();
    assert_eq!(store.last_document().map(|d| d.id), Some(small.id().clone()));
    assert_eq!(used_with_small, fresh.store().unwrap().used_bytes());
}
