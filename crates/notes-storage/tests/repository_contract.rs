//! Behaviour every adapter must share, run against each adapter that can be
//! built without an external server.
//!
//! Each backend gets its own module generated by `contract_tests!`, so a
//! failure names both the backend and the property.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use notes_core::error::NotesError;
use notes_core::types::{NoteDraft, NotePatch, SearchScope};
use notes_storage::{MemoryRepository, NoteRepository, RetryPolicy, SqliteRepository};

// =============================================================================
// Fixtures
// =============================================================================

fn memory() -> Arc<dyn NoteRepository> {
    Arc::new(MemoryRepository::new())
}

fn sqlite_in_memory() -> Arc<dyn NoteRepository> {
    Arc::new(SqliteRepository::in_memory().unwrap())
}

/// File-backed SQLite; the directory lives as long as the process.
fn sqlite_file() -> Arc<dyn NoteRepository> {
    let dir = tempfile::tempdir().unwrap().into_path();
    let path = dir.join("notes.db");
    Arc::new(SqliteRepository::open(path.to_str().unwrap(), RetryPolicy::none()).unwrap())
}

/// Created notes must be distinguishable by `created_at`.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(3)).await;
}

// =============================================================================
// Properties
// =============================================================================

async fn create_then_get_round_trips(repo: Arc<dyn NoteRepository>) {
    let before = Utc::now() - chrono::Duration::seconds(1);
    let id = repo
        .create(&NoteDraft::new("Groceries", "Buy milk and eggs"))
        .await
        .unwrap();

    let note = repo.get(&id).await.unwrap();
    assert_eq!(note.id, id);
    assert_eq!(note.title, "Groceries");
    assert_eq!(note.content, "Buy milk and eggs");
    assert!(note.created_at >= before);
    assert_eq!(note.due_at, None);
    assert_eq!(note.updated_at, None);
}

async fn create_keeps_due_at(repo: Arc<dyn NoteRepository>) {
    let due = notes_core::types::now_millis() + chrono::Duration::hours(3);
    let id = repo
        .create(&NoteDraft::new("Dentist", "Tuesday").with_due_at(due))
        .await
        .unwrap();
    assert_eq!(repo.get(&id).await.unwrap().due_at, Some(due));
}

async fn blank_fields_are_rejected(repo: Arc<dyn NoteRepository>) {
    let err = repo.create(&NoteDraft::new("   ", "body")).await.unwrap_err();
    assert!(matches!(err, NotesError::ConstraintViolation(_)));
    let err = repo.create(&NoteDraft::new("title", "")).await.unwrap_err();
    assert!(matches!(err, NotesError::ConstraintViolation(_)));
    assert_eq!(repo.count().await.unwrap(), 0);
}

async fn get_missing_is_not_found(repo: Arc<dyn NoteRepository>) {
    let err = repo.get("999999").await.unwrap_err();
    assert!(matches!(err, NotesError::NotFound(_)));
}

async fn delete_is_idempotent(repo: Arc<dyn NoteRepository>) {
    let id = repo.create(&NoteDraft::new("temp", "gone soon")).await.unwrap();

    assert!(repo.delete(&id).await.unwrap());
    assert!(matches!(repo.get(&id).await, Err(NotesError::NotFound(_))));
    assert!(!repo.delete(&id).await.unwrap());
}

async fn update_merges_supplied_fields(repo: Arc<dyn NoteRepository>) {
    let id = repo
        .create(&NoteDraft::new("Draft title", "Original body"))
        .await
        .unwrap();
    let original = repo.get(&id).await.unwrap();

    let updated = repo
        .update(&id, &NotePatch::default().title("Final title"))
        .await
        .unwrap();
    assert_eq!(updated.title, "Final title");
    assert_eq!(updated.content, "Original body");
    assert_eq!(updated.created_at, original.created_at);
    assert!(updated.updated_at.is_some());

    let due = notes_core::types::now_millis() + chrono::Duration::days(1);
    let with_due = repo
        .update(&id, &NotePatch::default().due_at(Some(due)))
        .await
        .unwrap();
    assert_eq!(with_due.due_at, Some(due));
    assert_eq!(with_due.title, "Final title");

    let cleared = repo
        .update(&id, &NotePatch::default().due_at(None))
        .await
        .unwrap();
    assert_eq!(cleared.due_at, None);

    assert_eq!(repo.get(&id).await.unwrap(), cleared);
}

async fn update_missing_is_not_found(repo: Arc<dyn NoteRepository>) {
    let err = repo
        .update("424242", &NotePatch::default().title("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, NotesError::NotFound(_)));
}

async fn update_rejects_blank_title(repo: Arc<dyn NoteRepository>) {
    let id = repo.create(&NoteDraft::new("keep", "me")).await.unwrap();
    let err = repo
        .update(&id, &NotePatch::default().title(" "))
        .await
        .unwrap_err();
    assert!(matches!(err, NotesError::ConstraintViolation(_)));
    assert_eq!(repo.get(&id).await.unwrap().title, "keep");
}

async fn search_is_case_insensitive_and_scoped(repo: Arc<dyn NoteRepository>) {
    let shopping = repo
        .create(&NoteDraft::new("Shopping", "Buy MILK"))
        .await
        .unwrap();
    tick().await;
    let milk_run = repo
        .create(&NoteDraft::new("Milk run", "corner shop"))
        .await
        .unwrap();
    tick().await;
    repo.create(&NoteDraft::new("Unrelated", "nothing here"))
        .await
        .unwrap();

    let both = repo.search("milk", SearchScope::Both).await.unwrap();
    let ids: Vec<&str> = both.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec![milk_run.as_str(), shopping.as_str()]);

    let titles = repo.search("MILK", SearchScope::Title).await.unwrap();
    assert_eq!(titles.len(), 1);
    assert_eq!(titles[0].id, milk_run);

    let contents = repo.search("Milk", SearchScope::Content).await.unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].id, shopping);

    for note in &both {
        let haystack = format!("{} {}", note.title, note.content).to_lowercase();
        assert!(haystack.contains("milk"));
    }
}

async fn empty_search_matches_nothing(repo: Arc<dyn NoteRepository>) {
    repo.create(&NoteDraft::new("anything", "at all")).await.unwrap();
    assert!(repo.search("", SearchScope::Both).await.unwrap().is_empty());
    assert!(repo.search("   ", SearchScope::Both).await.unwrap().is_empty());
}

async fn search_treats_wildcards_literally(repo: Arc<dyn NoteRepository>) {
    repo.create(&NoteDraft::new("50% off", "sale")).await.unwrap();
    repo.create(&NoteDraft::new("500 items", "stock")).await.unwrap();

    let hits = repo.search("0%", SearchScope::Title).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "50% off");
    assert!(repo.search("_", SearchScope::Both).await.unwrap().is_empty());
}

async fn list_recent_is_newest_first(repo: Arc<dyn NoteRepository>) {
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(
            repo.create(&NoteDraft::new(format!("note {}", i), "body"))
                .await
                .unwrap(),
        );
        tick().await;
    }

    let recent = repo.list_recent(Some(2)).await.unwrap();
    let got: Vec<&str> = recent.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(got, vec![ids[3].as_str(), ids[2].as_str()]);

    assert_eq!(repo.list_recent(None).await.unwrap().len(), 4);
    assert!(repo.list_recent(Some(0)).await.unwrap().is_empty());
}

async fn upcoming_respects_window(repo: Arc<dyn NoteRepository>) {
    let now = Utc::now();
    let soon = repo
        .create(&NoteDraft::new("soon", "x").with_due_at(now + chrono::Duration::hours(2)))
        .await
        .unwrap();
    repo.create(&NoteDraft::new("later", "x").with_due_at(now + chrono::Duration::days(3)))
        .await
        .unwrap();
    repo.create(&NoteDraft::new("past", "x").with_due_at(now - chrono::Duration::hours(1)))
        .await
        .unwrap();
    repo.create(&NoteDraft::new("none", "x")).await.unwrap();

    let due = repo.upcoming(Duration::from_secs(24 * 3600)).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, soon);
}

async fn stats_agree_with_list_recent(repo: Arc<dyn NoteRepository>) {
    let due = Utc::now() + chrono::Duration::days(2);
    repo.create(&NoteDraft::new("a", "1").with_due_at(due)).await.unwrap();
    repo.create(&NoteDraft::new("b", "2")).await.unwrap();
    repo.create(&NoteDraft::new("c", "3")).await.unwrap();

    let stats = repo.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.with_reminder, 1);
    assert_eq!(stats.without_reminder, 2);
    assert_eq!(stats.last_7_days, 3);
    assert_eq!(stats.total, repo.list_recent(None).await.unwrap().len() as u64);
    assert_eq!(stats.total, repo.count().await.unwrap());
}

async fn health_reports_count(repo: Arc<dyn NoteRepository>) {
    repo.create(&NoteDraft::new("a", "b")).await.unwrap();
    let health = repo.health().await;
    assert!(health.is_healthy());
    assert_eq!(health.note_count, 1);
    assert_eq!(health.name, repo.kind());
}

async fn closed_adapter_reports_connection_errors(repo: Arc<dyn NoteRepository>) {
    repo.close().await.unwrap();
    repo.close().await.unwrap();
    assert!(matches!(repo.count().await, Err(NotesError::Connection(_))));
    assert!(!repo.health().await.is_healthy());
}

// =============================================================================
// Per-backend instantiation
// =============================================================================

macro_rules! contract_tests {
    ($backend:ident, $fixture:expr) => {
        mod $backend {
            use super::*;

            #[tokio::test]
            async fn create_then_get() {
                create_then_get_round_trips($fixture).await;
            }

            #[tokio::test]
            async fn due_at_is_kept() {
                create_keeps_due_at($fixture).await;
            }

            #[tokio::test]
            async fn blank_fields() {
                blank_fields_are_rejected($fixture).await;
            }

            #[tokio::test]
            async fn get_missing() {
                get_missing_is_not_found($fixture).await;
            }

            #[tokio::test]
            async fn delete_idempotent() {
                delete_is_idempotent($fixture).await;
            }

            #[tokio::test]
            async fn update_merges() {
                update_merges_supplied_fields($fixture).await;
            }

            #[tokio::test]
            async fn update_missing() {
                update_missing_is_not_found($fixture).await;
            }

            #[tokio::test]
            async fn update_blank_title() {
                update_rejects_blank_title($fixture).await;
            }

            #[tokio::test]
            async fn search_scoped() {
                search_is_case_insensitive_and_scoped($fixture).await;
            }

            #[tokio::test]
            async fn search_empty() {
                empty_search_matches_nothing($fixture).await;
            }

            #[tokio::test]
            async fn search_wildcards() {
                search_treats_wildcards_literally($fixture).await;
            }

            #[tokio::test]
            async fn recent_order() {
                list_recent_is_newest_first($fixture).await;
            }

            #[tokio::test]
            async fn upcoming_window() {
                upcoming_respects_window($fixture).await;
            }

            #[tokio::test]
            async fn stats_totals() {
                stats_agree_with_list_recent($fixture).await;
            }

            #[tokio::test]
            async fn health() {
                health_reports_count($fixture).await;
            }

            #[tokio::test]
            async fn closed() {
                closed_adapter_reports_connection_errors($fixture).await;
            }
        }
    };
}

contract_tests!(progress, memory());
contract_tests!(sqlite_memory, sqlite_in_memory());
contract_tests!(sqlite_on_disk, sqlite_file());
