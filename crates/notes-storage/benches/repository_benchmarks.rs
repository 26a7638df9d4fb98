//! Micro-benchmarks for the always-built adapters.
//!
//! Measures single-note insert and a title/content search over a populated
//! store for the in-memory and SQLite adapters. Set `BENCH_NOTE_COUNT` to
//! change the population size (default 1,000).

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use notes_core::types::{NoteDraft, SearchScope};
use notes_storage::{MemoryRepository, NoteRepository, SqliteRepository};

const DEFAULT_NOTE_COUNT: usize = 1_000;

fn note_count() -> usize {
    std::env::var("BENCH_NOTE_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_NOTE_COUNT)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
}

fn draft(i: usize) -> NoteDraft {
    NoteDraft::new(
        format!("bench-note-{:06}", i),
        format!("Performance test record {} about quarterly planning", i),
    )
}

fn adapters() -> Vec<(&'static str, Arc<dyn NoteRepository>)> {
    vec![
        ("progress", Arc::new(MemoryRepository::new())),
        (
            "sqlite",
            Arc::new(SqliteRepository::in_memory().expect("sqlite open failed")),
        ),
    ]
}

fn populate(rt: &tokio::runtime::Runtime, repo: &Arc<dyn NoteRepository>, count: usize) {
    rt.block_on(async {
        for i in 0..count {
            repo.create(&draft(i)).await.expect("insert failed");
        }
    });
}

fn bench_insert(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("insert");
    group.measurement_time(Duration::from_secs(5));

    for (name, repo) in adapters() {
        let mut i = 0usize;
        group.bench_function(name, |b| {
            b.iter(|| {
                i += 1;
                rt.block_on(repo.create(&draft(i))).expect("insert failed")
            });
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let rt = runtime();
    let count = note_count();
    let mut group = c.benchmark_group("search");
    group.measurement_time(Duration::from_secs(5));

    for (name, repo) in adapters() {
        populate(&rt, &repo, count);

        group.bench_function(format!("{}_hit_{}notes", name, count), |b| {
            b.iter(|| {
                let hits = rt
                    .block_on(repo.search("record 42", SearchScope::Both))
                    .expect("search failed");
                assert!(!hits.is_empty(), "Search should return results");
                hits
            });
        });

        group.bench_function(format!("{}_miss_{}notes", name, count), |b| {
            b.iter(|| {
                rt.block_on(repo.search("missing-needle", SearchScope::Both))
                    .expect("search failed")
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_search);
criterion_main!(benches);
