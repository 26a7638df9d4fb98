//! MongoDB adapter.
//!
//! Notes live in one collection. Ids are ObjectIds rendered as hex; a string
//! that does not parse as an ObjectId cannot exist. Timestamps are BSON dates,
//! which carry millisecond precision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    CreateCollectionOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{info, warn};

use notes_core::config::MongoConfig;
use notes_core::error::{NotesError, Result};
use notes_core::types::{
    now_millis, BackendKind, Note, NoteDraft, NotePatch, NoteStats, SearchScope,
};

use crate::repository::{closed_error, NoteRepository};
use crate::retry::RetryPolicy;
use crate::search;

const COLLECTION: &str = "notes";

/// Server error codes: failed `$jsonSchema` validation, duplicate key, and
/// an already existing collection.
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
const DUPLICATE_KEY: i32 = 11000;
const NAMESPACE_EXISTS: i32 = 48;

pub struct MongoRepository {
    client: Client,
    notes: Collection<Document>,
    retry: RetryPolicy,
    closed: AtomicBool,
}

impl MongoRepository {
    pub async fn connect(config: &MongoConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| NotesError::Connection(format!("Invalid MongoDB URI {}: {}", config.uri, e)))?;
        let db = client.database(&config.database);

        // The driver connects lazily; ping so a dead server fails here.
        db.run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(map_mongo_error)?;

        ensure_collection(&db).await?;
        let notes = db.collection::<Document>(COLLECTION);
        let repo = Self {
            client,
            notes,
            retry,
            closed: AtomicBool::new(false),
        };
        repo.ensure_indexes().await?;
        info!(database = %config.database, "Connected to MongoDB");
        Ok(repo)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "created_at": -1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "due_at": 1 })
                .options(IndexOptions::builder().sparse(true).build())
                .build(),
        ];
        self.notes
            .create_indexes(indexes, None)
            .await
            .map_err(map_mongo_error)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error(BackendKind::Mongo));
        }
        Ok(())
    }

    async fn find_notes(
        &self,
        operation: &str,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Vec<Note>> {
        self.ensure_open()?;
        let docs: Vec<Document> = self
            .retry
            .run(operation, || async {
                let cursor = self
                    .notes
                    .find(filter.clone(), options.clone())
                    .await
                    .map_err(map_mongo_error)?;
                cursor.try_collect().await.map_err(map_mongo_error)
            })
            .await?;
        docs.iter().map(document_to_note).collect()
    }

    async fn count_where(&self, operation: &str, filter: Document) -> Result<u64> {
        self.ensure_open()?;
        self.retry
            .run(operation, || async {
                self.notes
                    .count_documents(filter.clone(), None)
                    .await
                    .map_err(map_mongo_error)
            })
            .await
    }
}

/// Create the collection with a schema validator so blank or missing fields are
/// rejected server side. An existing collection is left as is.
async fn ensure_collection(db: &Database) -> Result<()> {
    let validator = doc! {
        "$jsonSchema": {
            "bsonType": "object",
            "required": ["title", "content", "created_at"],
            "properties": {
                "title": { "bsonType": "string", "minLength": 1 },
                "content": { "bsonType": "string", "minLength": 1 },
                "created_at": { "bsonType": "date" },
                "due_at": { "bsonType": ["date", "null"] },
            }
        }
    };
    let options = CreateCollectionOptions::builder().validator(validator).build();
    match db.create_collection(COLLECTION, options).await {
        Ok(()) => Ok(()),
        Err(e) if matches!(e.kind.as_ref(), ErrorKind::Command(c) if c.code == NAMESPACE_EXISTS) => {
            Ok(())
        }
        Err(e) => Err(map_mongo_error(e)),
    }
}

fn to_bson_date(ts: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(ts.timestamp_millis())
}

fn from_bson_date(ts: &bson::DateTime) -> Result<DateTime<Utc>> {
    crate::timestamp::from_millis(ts.timestamp_millis())
}

fn optional_date(doc: &Document, key: &str) -> Result<Option<DateTime<Utc>>> {
    match doc.get(key) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::DateTime(ts)) => from_bson_date(ts).map(Some),
        Some(other) => Err(NotesError::Serialization(format!(
            "field {} is not a date: {}",
            key, other
        ))),
    }
}

fn document_to_note(doc: &Document) -> Result<Note> {
    let field = |e: bson::document::ValueAccessError| NotesError::Serialization(e.to_string());
    Ok(Note {
        id: doc.get_object_id("_id").map_err(field)?.to_hex(),
        title: doc.get_str("title").map_err(field)?.to_string(),
        content: doc.get_str("content").map_err(field)?.to_string(),
        due_at: optional_date(doc, "due_at")?,
        created_at: from_bson_date(doc.get_datetime("created_at").map_err(field)?)?,
        updated_at: optional_date(doc, "updated_at")?,
    })
}

/// Translate a driver error into the shared taxonomy.
pub(crate) fn map_mongo_error(err: mongodb::error::Error) -> NotesError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write))
            if write.code == DOCUMENT_VALIDATION_FAILURE || write.code == DUPLICATE_KEY =>
        {
            NotesError::ConstraintViolation(err.to_string())
        }
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => NotesError::Connection(err.to_string()),
        _ => NotesError::Backend(err.to_string()),
    }
}

fn object_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id.trim()).ok()
}

#[async_trait]
impl NoteRepository for MongoRepository {
    fn kind(&self) -> BackendKind {
        BackendKind::Mongo
    }

    async fn create(&self, draft: &NoteDraft) -> Result<String> {
        draft.validate()?;
        self.ensure_open()?;
        let mut note = doc! {
            "title": &draft.title,
            "title_lc": draft.title.to_lowercase(),
            "content": &draft.content,
            "content_lc": draft.content.to_lowercase(),
            "created_at": to_bson_date(now_millis()),
        };
        if let Some(due_at) = draft.due_at {
            note.insert("due_at", to_bson_date(due_at));
        }
        let result = self
            .retry
            .run("mongo.create", || async {
                self.notes
                    .insert_one(note.clone(), None)
                    .await
                    .map_err(map_mongo_error)
            })
            .await?;
        let id = match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => {
                return Err(NotesError::Backend(format!(
                    "MongoDB returned a non-ObjectId id: {}",
                    other
                )))
            }
        };
        info!(backend = "mongo", id = %id, "Note added");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Note> {
        self.ensure_open()?;
        let oid = object_id(id).ok_or_else(|| NotesError::NotFound(id.to_string()))?;
        let found = self
            .retry
            .run("mongo.get", || async {
                self.notes
                    .find_one(doc! { "_id": oid }, None)
                    .await
                    .map_err(map_mongo_error)
            })
            .await?;
        match found {
            Some(doc) => document_to_note(&doc),
            None => Err(NotesError::NotFound(id.to_string())),
        }
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note> {
        patch.validate()?;
        self.ensure_open()?;
        let oid = object_id(id).ok_or_else(|| NotesError::NotFound(id.to_string()))?;

        let mut set = doc! { "updated_at": to_bson_date(now_millis()) };
        let mut unset = Document::new();
        if let Some(title) = &patch.title {
            set.insert("title", title);
            set.insert("title_lc", title.to_lowercase());
        }
        if let Some(content) = &patch.content {
            set.insert("content", content);
            set.insert("content_lc", content.to_lowercase());
        }
        match patch.due_at {
            Some(Some(due_at)) => {
                set.insert("due_at", to_bson_date(due_at));
            }
            Some(None) => {
                unset.insert("due_at", "");
            }
            None => {}
        }
        let mut update = doc! { "$set": set };
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .retry
            .run("mongo.update", || async {
                self.notes
                    .find_one_and_update(doc! { "_id": oid }, update.clone(), options.clone())
                    .await
                    .map_err(map_mongo_error)
            })
            .await?;
        match updated {
            Some(doc) => document_to_note(&doc),
            None => Err(NotesError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.ensure_open()?;
        let Some(oid) = object_id(id) else {
            warn!(backend = "mongo", id, "Attempt to delete non-existent note");
            return Ok(false);
        };
        let result = self
            .retry
            .run("mongo.delete", || async {
                self.notes
                    .delete_one(doc! { "_id": oid }, None)
                    .await
                    .map_err(map_mongo_error)
            })
            .await?;
        let removed = result.deleted_count > 0;
        if removed {
            info!(backend = "mongo", id, "Note deleted");
        } else {
            warn!(backend = "mongo", id, "Attempt to delete non-existent note");
        }
        Ok(removed)
    }

    async fn search(&self, query: &str, scope: SearchScope) -> Result<Vec<Note>> {
        let Some(needle) = search::normalize_query(query) else {
            return Ok(Vec::new());
        };
        let pattern = regex::escape(&needle);
        let mut clauses = Vec::new();
        if scope.includes_title() {
            clauses.push(doc! { "title_lc": { "$regex": &pattern } });
        }
        if scope.includes_content() {
            clauses.push(doc! { "content_lc": { "$regex": &pattern } });
        }
        let candidates = self
            .find_notes("mongo.search", doc! { "$or": clauses }, None)
            .await?;
        let hits = search::finish_search(candidates, &needle, scope);
        info!(backend = "mongo", query, results = hits.len(), "Search performed");
        Ok(hits)
    }

    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<Note>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1, "_id": 1 })
            .limit(limit.map(|l| l as i64))
            .build();
        let notes = self
            .find_notes("mongo.list_recent", Document::new(), Some(options))
            .await?;
        Ok(search::finish_recent(notes, limit))
    }

    async fn upcoming(&self, window: Duration) -> Result<Vec<Note>> {
        let now = Utc::now();
        let until = search::window_end(now, window);
        let filter = doc! {
            "due_at": { "$gte": to_bson_date(now), "$lte": to_bson_date(until) }
        };
        let notes = self.find_notes("mongo.upcoming", filter, None).await?;
        Ok(search::finish_upcoming(notes, now, until))
    }

    async fn count(&self) -> Result<u64> {
        self.count_where("mongo.count", Document::new()).await
    }

    async fn stats(&self) -> Result<NoteStats> {
        let week_ago = Utc::now() - chrono::Duration::days(7);
        let total = self.count_where("mongo.stats", Document::new()).await?;
        let with_reminder = self
            .count_where("mongo.stats", doc! { "due_at": { "$type": "date" } })
            .await?;
        let last_7_days = self
            .count_where(
                "mongo.stats",
                doc! { "created_at": { "$gte": to_bson_date(week_ago) } },
            )
            .await?;
        Ok(NoteStats {
            total,
            with_reminder,
            without_reminder: total.saturating_sub(with_reminder),
            last_7_days,
        })
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.client.clone().shutdown().await;
            info!("MongoDB client closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_parsing() {
        assert!(object_id("64b7f0c2e1a4c3b2a1d0e9f8").is_some());
        assert!(object_id("42").is_none());
    }

    #[test]
    fn test_document_round_trip() {
        let oid = ObjectId::new();
        let created = now_millis();
        let doc = doc! {
            "_id": oid,
            "title": "t",
            "content": "c",
            "created_at": to_bson_date(created),
            "due_at": Bson::Null,
        };
        let note = document_to_note(&doc).unwrap();
        assert_eq!(note.id, oid.to_hex());
        assert_eq!(note.created_at, created);
        assert_eq!(note.due_at, None);
    }
}
