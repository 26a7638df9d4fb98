//! The synthetic workload every backend is measured against.

use notes_core::config::BenchConfig;
use notes_core::types::NoteDraft;

/// Every synthetic title starts with this, so leftovers from an interrupted
/// run are easy to find.
pub const TITLE_PREFIX: &str = "notes-bench-";

#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    pub note_count: usize,
    pub search_queries: Vec<String>,
    pub iterations: u32,
}

impl Workload {
    pub fn new(note_count: usize, search_queries: Vec<String>, iterations: u32) -> Self {
        Self {
            note_count,
            search_queries,
            iterations: iterations.max(1),
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(
            config.note_count,
            config.search_queries.clone(),
            config.iterations,
        )
    }

    pub fn title(index: usize) -> String {
        format!("{}{:06}", TITLE_PREFIX, index)
    }

    /// Deterministic draft for note `index`.
    pub fn draft(index: usize) -> NoteDraft {
        NoteDraft::new(
            Self::title(index),
            format!("Performance test record {}", index),
        )
    }

    pub fn drafts(&self) -> impl Iterator<Item = NoteDraft> {
        (0..self.note_count).map(Self::draft)
    }
}
