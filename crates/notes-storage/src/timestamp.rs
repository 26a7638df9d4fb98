//! Epoch-millisecond encoding for engines without a native timestamp type
//! we can rely on (SQLite, Neo4j properties, Cassandra bigint, BSON dates).

use chrono::{DateTime, Utc};

use notes_core::error::{NotesError, Result};

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| NotesError::Serialization(format!("timestamp out of range: {}", ms)))
}

pub fn from_optional_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}
