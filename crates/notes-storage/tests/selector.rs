//! Backend selector: lazy construction, switching, and exclusion between
//! `switch` and in-flight leases.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use notes_core::config::NotesConfig;
use notes_core::error::{NotesError, Result};
use notes_core::types::{BackendKind, NoteDraft};
use notes_storage::{BackendFactory, BackendSelector, MemoryRepository, NoteRepository};

/// Hands out fresh in-memory adapters for any kind and remembers them.
#[derive(Default)]
struct RecordingFactory {
    connects: AtomicUsize,
    opened: std::sync::Mutex<Vec<(BackendKind, Arc<dyn NoteRepository>)>>,
}

impl RecordingFactory {
    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn opened(&self, index: usize) -> Arc<dyn NoteRepository> {
        Arc::clone(&self.opened.lock().unwrap()[index].1)
    }
}

#[async_trait]
impl BackendFactory for RecordingFactory {
    async fn connect(&self, kind: BackendKind) -> Result<Arc<dyn NoteRepository>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers could race.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let repo: Arc<dyn NoteRepository> = Arc::new(MemoryRepository::new());
        self.opened.lock().unwrap().push((kind, Arc::clone(&repo)));
        Ok(repo)
    }
}

fn selector(kind: BackendKind) -> (Arc<RecordingFactory>, Arc<BackendSelector>) {
    let factory = Arc::new(RecordingFactory::default());
    let selector = BackendSelector::new(factory.clone(), kind);
    (factory, Arc::new(selector))
}

#[test]
fn test_unknown_configured_backend_fails_fast() {
    let factory = Arc::new(RecordingFactory::default());
    let mut config = NotesConfig::default();
    config.general.active_backend = "oracle".to_string();

    let err = BackendSelector::from_config(&config, factory.clone())
        .err()
        .unwrap();
    assert!(matches!(err, NotesError::UnsupportedBackend(ref name) if name == "oracle"));
    assert_eq!(factory.connects(), 0);
}

#[tokio::test]
async fn test_active_is_lazy_and_connects_once() {
    let (factory, selector) = selector(BackendKind::Sqlite);
    assert_eq!(factory.connects(), 0);
    assert_eq!(selector.current_kind().await, BackendKind::Sqlite);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let selector = Arc::clone(&selector);
        handles.push(tokio::spawn(async move {
            selector.active().await.unwrap().kind()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), BackendKind::Sqlite);
    }
    assert_eq!(factory.connects(), 1);
}

#[tokio::test]
async fn test_switch_rejects_unknown_name_without_touching_active() {
    let (factory, selector) = selector(BackendKind::Progress);
    selector.active().await.unwrap();

    let err = selector.switch("couchdb").await.unwrap_err();
    assert!(matches!(err, NotesError::UnsupportedBackend(_)));
    assert_eq!(factory.connects(), 1);
    assert!(factory.opened(0).count().await.is_ok());
}

#[tokio::test]
async fn test_switch_closes_previous_adapter() {
    let (factory, selector) = selector(BackendKind::Progress);
    selector.active().await.unwrap();

    let kind = selector.switch(" PostgreSQL ").await.unwrap();
    assert_eq!(kind, BackendKind::Postgresql);
    assert_eq!(selector.active().await.unwrap().kind(), BackendKind::Postgresql);

    let old = factory.opened(0);
    assert!(matches!(old.count().await, Err(NotesError::Connection(_))));
    assert_eq!(factory.connects(), 2);
}

#[tokio::test]
async fn test_switch_waits_for_in_flight_lease() {
    let (factory, selector) = selector(BackendKind::Progress);
    let lease = selector.active().await.unwrap();

    let switching = {
        let selector = Arc::clone(&selector);
        tokio::spawn(async move { selector.switch("sqlite").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!switching.is_finished());

    // Still the pre-switch adapter, and still open.
    assert_eq!(lease.kind(), BackendKind::Progress);
    lease.create(&NoteDraft::new("before", "switch")).await.unwrap();
    drop(lease);

    assert_eq!(switching.await.unwrap().unwrap(), BackendKind::Sqlite);

    let after = selector.active().await.unwrap();
    assert_eq!(after.kind(), BackendKind::Sqlite);
    assert_eq!(after.count().await.unwrap(), 0);
    drop(after);

    assert!(factory.opened(0).count().await.is_err());
}

#[tokio::test]
async fn test_shutdown_closes_active() {
    let (factory, selector) = selector(BackendKind::Progress);
    selector.active().await.unwrap();
    selector.shutdown().await.unwrap();
    selector.shutdown().await.unwrap();

    assert!(factory.opened(0).count().await.is_err());
}

#[tokio::test]
async fn test_try_connected_never_waits_on_a_switch() {
    let (_, selector) = selector(BackendKind::Progress);
    assert!(selector.try_connected().is_none());

    let lease = selector.active().await.unwrap();
    assert_eq!(
        selector.try_connected().map(|l| l.kind()),
        Some(BackendKind::Progress)
    );

    let switching = {
        let selector = Arc::clone(&selector);
        tokio::spawn(async move { selector.switch("sqlite").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The queued switch owns the lock's next turn.
    assert!(selector.try_connected().is_none());

    drop(lease);
    switching.await.unwrap().unwrap();
    assert_eq!(
        selector.try_connected().map(|l| l.kind()),
        Some(BackendKind::Sqlite)
    );
}
