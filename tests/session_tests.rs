use std::sync::Arc;
use std::time::Duration;

use pageflip::flip::{
    Direction, DocumentHandle, LoadFailure, MemoryStore, PageSlot, Session, SessionError,
    SessionPhase, SizingPolicy,
};
use pageflip::test_utils::{ScriptedBackend, page_pixels};

fn session_for(backend: &Arc<ScriptedBackend>) -> Session {
    Session::new(backend.clone())
}

fn loaded(backend: &Arc<ScriptedBackend>) -> Session {
    let mut session = session_for(backend);
    session.load(backend.document()).unwrap();
    session
}

#[test]
fn large_document_uses_smallest_buffer() {
    let backend = Arc::new(ScriptedBackend::new(600));
    let mut session = loaded(&backend);

    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(session.sizing(), Some(SizingPolicy::VERY_LARGE));
    let stats = session.stats();
    assert_eq!(stats.buffer_size, 4);
    assert_eq!(stats.quality, 0.5);

    session.settle();
    assert!(session.cache().size() <= 4);
    assert!(session.cache().contains(1));
    assert!(session.cache().contains(2));
}

#[test]
fn initial_burst_renders_leading_pages() {
    let backend = Arc::new(ScriptedBackend::new(30));
    let mut session = loaded(&backend);
    session.settle();

    for page in 1..=6 {
        assert!(session.cache().contains(page), "page {page} missing");
    }
    assert_eq!(backend.render_count(1), 1);
}

#[test]
fn forward_plan_covers_next_spread_and_run() {
    let backend = Arc::new(ScriptedBackend::new(600));
    let mut session = loaded(&backend);

    session.go_to_index(1);
    let plan = session.schedule();
    assert_eq!(plan.visible, vec![1, 2]);
    assert_eq!(plan.next, vec![3, 4, 5, 6, 7, 8]);
    assert!(plan.previous.is_empty());
}

#[test]
fn backward_plan_runs_behind_previous_spread() {
    let backend = Arc::new(ScriptedBackend::new(600));
    let mut session = loaded(&backend);

    session.on_position_changed(10);
    session.on_position_changed(9);
    assert_eq!(session.position().index, 18);
    assert_eq!(session.position().direction, Direction::Backward);

    let plan = session.schedule();
    assert_eq!(plan.visible, vec![19, 20]);
    assert_eq!(plan.next, vec![21, 22, 13, 14, 15, 16]);
    assert_eq!(plan.previous, vec![17, 18]);
}

#[test]
fn visible_spread_is_rendered_before_returning() {
    let backend = Arc::new(ScriptedBackend::new(600).with_delay(Duration::from_millis(5)));
    let mut session = loaded(&backend);

    session.on_position_changed(20);
    assert!(session.cache().contains(41));
    assert!(session.cache().contains(42));
    let spreads = session.spreads();
    assert!(spreads[20].is_visible);
    assert!(spreads[20].left.is_ready());
    assert!(spreads[20].right.is_ready());
}

#[test]
fn cache_stays_within_buffer_while_reading() {
    let backend = Arc::new(ScriptedBackend::new(600));
    let mut session = loaded(&backend);

    for spread in 1..12 {
        session.on_position_changed(spread);
        session.settle();

        let visible = [spread * 2 + 1, spread * 2 + 2];
        assert!(session.cache().size() <= 4, "cache: {:?}", session.cache().pages());
        for page in visible {
            assert!(session.cache().contains(page), "visible page {page} evicted");
        }
    }
}

#[test]
fn cache_stays_within_buffer_when_pages_come_from_store() {
    let backend = Arc::new(ScriptedBackend::new(600));
    let mut session = session_for(&backend).with_store(Box::new(MemoryStore::new(64 * 1024 * 1024)));
    session.load(backend.document()).unwrap();

    let forward: Vec<usize> = (1..8).collect();
    for spread in forward.iter().copied().chain(forward.iter().rev().copied()) {
        session.on_position_changed(spread);
        session.settle();
        assert!(session.cache().size() <= 4, "cache: {:?}", session.cache().pages());
    }

    // Reading back over stored pages needs no renders at all
    let renders = backend.total_renders();
    for spread in (0..7).rev() {
        session.on_position_changed(spread);
        session.poll_responses();
        assert!(session.in_flight_pages().is_empty());
        assert!(session.cache().size() <= 4, "cache: {:?}", session.cache().pages());
        assert!(session.cache().contains(spread * 2 + 1));
    }
    assert_eq!(backend.total_renders(), renders);
}

#[test]
fn pages_in_flight_are_not_requested_twice() {
    let backend = Arc::new(ScriptedBackend::new(600).with_delay(Duration::from_millis(20)));
    let mut session = loaded(&backend);

    // Pages 3 and 4 were dispatched as next-spread prefetch during load
    assert!(session.is_in_flight(3));
    session.go_to_index(2);
    session.settle();

    assert!(session.cache().contains(3));
    assert_eq!(backend.render_count(3), 1);
    assert_eq!(backend.render_count(4), 1);
}

#[test]
fn failed_prefetch_is_retried_on_revisit() {
    let backend = Arc::new(ScriptedBackend::new(20).failing(7, 1));
    let mut session = loaded(&backend);
    session.settle();

    assert_eq!(backend.render_count(7), 1);
    assert!(!session.cache().contains(7));
    assert!(session.failed_pages().is_empty());

    session.on_position_changed(3);
    assert!(session.cache().contains(7));
    assert_eq!(backend.render_count(7), 2);
    assert_eq!(session.phase(), SessionPhase::Ready);
}

#[test]
fn visible_failure_shows_placeholder() {
    let backend = Arc::new(ScriptedBackend::new(20).always_failing(3));
    let mut session = loaded(&backend);

    session.go_to_index(2);
    session.settle();

    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(session.failed_pages(), vec![3]);
    let spreads = session.spreads();
    assert!(matches!(spreads[1].left, PageSlot::Failed));
    assert!(spreads[1].right.is_ready());
    assert_eq!(session.stats().failed_pages, 1);
}

#[test]
fn clear_is_idempotent() {
    let backend = Arc::new(ScriptedBackend::new(20).with_delay(Duration::from_millis(5)));
    let mut session = loaded(&backend);

    session.clear();
    assert!(session.cache().is_empty());
    assert!(session.in_flight_pages().is_empty());

    session.clear();
    assert!(session.cache().is_empty());
    assert!(session.in_flight_pages().is_empty());

    // Renders issued before the clear never land in the cache
    std::thread::sleep(Duration::from_millis(50));
    session.poll_responses();
    assert!(session.cache().is_empty());
}

#[test]
fn zoom_change_replaces_renders() {
    let backend = Arc::new(ScriptedBackend::new(20).with_delay(Duration::from_millis(5)));
    let mut session = loaded(&backend);

    session.zoom_in();
    session.settle();

    assert_eq!(session.stats().zoom_percent, 125);
    let expected = page_pixels(1.5 * 1.25);
    assert!(!session.cache().is_empty());
    for page in session.cache().pages() {
        let bitmap = session.cache().get(page).unwrap();
        assert_eq!((bitmap.width_px, bitmap.height_px), expected, "page {page}");
    }
}

#[test]
fn zoom_at_bound_keeps_cache() {
    let backend = Arc::new(ScriptedBackend::new(20));
    let mut session = loaded(&backend);

    session.on_zoom_changed(3.0);
    session.settle();
    let before = session.cache().pages();
    let renders = backend.total_renders();

    session.zoom_in();
    session.settle();
    assert_eq!(session.cache().pages(), before);
    assert_eq!(backend.total_renders(), renders);
}

#[test]
fn load_failure_returns_to_empty() {
    let backend = Arc::new(ScriptedBackend::new(20).unopenable());
    let mut session = session_for(&backend);

    let err = session.load(backend.document()).unwrap_err();
    assert!(matches!(err, SessionError::Load(LoadFailure::Open { .. })));
    assert_eq!(session.phase(), SessionPhase::Empty);
    assert!(session.document().is_none());
    assert!(session.spreads().is_empty());
    assert_eq!(backend.total_renders(), 0);
}

#[test]
fn failed_reload_drops_previous_document() {
    let backend = Arc::new(ScriptedBackend::new(20));
    let mut session = loaded(&backend);
    session.settle();
    assert!(!session.cache().is_empty());

    let err = session
        .load(DocumentHandle::from_bytes("empty.pdf", Vec::new()))
        .unwrap_err();
    assert!(matches!(err, SessionError::Load(LoadFailure::EmptyDocument)));
    assert_eq!(session.phase(), SessionPhase::Empty);
    assert!(session.cache().is_empty());
    assert_eq!(session.page_count(), 0);
}

#[test]
fn reset_returns_to_empty() {
    let backend = Arc::new(ScriptedBackend::new(20));
    let mut session = loaded(&backend);
    session.on_position_changed(4);

    session.reset();
    assert_eq!(session.phase(), SessionPhase::Empty);
    assert!(session.cache().is_empty());
    assert!(session.document().is_none());
    assert_eq!(session.position().index, 0);

    // Navigation without a document is ignored
    session.on_position_changed(2);
    assert_eq!(session.position().index, 0);
}

#[test]
fn dropping_session_with_renders_in_flight() {
    let backend = Arc::new(ScriptedBackend::new(100).with_delay(Duration::from_millis(10)));
    let session = loaded(&backend);
    assert!(!session.in_flight_pages().is_empty());
    drop(session);
}

#[test]
fn dropping_session_after_shutdown() {
    let backend = Arc::new(ScriptedBackend::new(20));
    let mut session = loaded(&backend);
    session.settle();

    session.shutdown();
    std::thread::sleep(Duration::from_millis(50));
    // Workers are gone; the second shutdown in drop must not panic
    drop(session);
}

#[test]
fn initial_burst_reports_completion() {
    let backend = Arc::new(ScriptedBackend::new(30).with_delay(Duration::from_millis(2)));
    let mut session = session_for(&backend);
    session.load(backend.document()).unwrap();

    // Progress reached 100 before the session became ready
    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(backend.render_count(6), 1);
}
