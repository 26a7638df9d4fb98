//! Runs the workload against each backend in turn.
//!
//! Every backend gets a fresh adapter from the factory, independent of the
//! serving selector. Per iteration the phases run strictly in order: insert,
//! lookup, search, stats, cleanup. A phase error ends that backend's run; its
//! notes are still cleaned up and the backend is left out of the results.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use notes_core::error::{NotesError, Result};
use notes_core::types::{BackendKind, BenchmarkResult, SearchScope};
use notes_storage::{BackendFactory, NoteRepository};

use crate::workload::Workload;

pub struct BenchmarkHarness {
    factory: Arc<dyn BackendFactory>,
    workload: Workload,
    phase_timeout: Duration,
}

/// Timings from one iteration, in seconds.
#[derive(Debug, Default, Clone, Copy)]
struct IterationTimings {
    insert: f64,
    lookup: f64,
    search: f64,
    total_notes: u64,
}

impl BenchmarkHarness {
    pub fn new(factory: Arc<dyn BackendFactory>, workload: Workload, phase_timeout: Duration) -> Self {
        Self {
            factory,
            workload,
            phase_timeout,
        }
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    /// Benchmark each backend sequentially. Failed backends are omitted, so
    /// the result may be shorter than `backends`; input order is preserved.
    pub async fn run(&self, backends: &[BackendKind]) -> Vec<BenchmarkResult> {
        let mut results = Vec::with_capacity(backends.len());
        for &kind in backends {
            match self.run_backend(kind).await {
                Ok(result) => {
                    info!(
                        backend = %kind,
                        insert_seconds = result.insert_seconds,
                        lookup_seconds = result.lookup_seconds,
                        search_seconds = result.search_seconds,
                        total_notes = result.total_notes_after_run,
                        "Benchmark complete"
                    );
                    results.push(result);
                }
                Err(e) => error!(backend = %kind, error = %e, "Benchmark failed, backend omitted"),
            }
        }
        results
    }

    /// Benchmark a single backend.
    pub async fn run_backend(&self, kind: BackendKind) -> Result<BenchmarkResult> {
        info!(
            backend = %kind,
            notes = self.workload.note_count,
            iterations = self.workload.iterations,
            "Starting benchmark"
        );
        let repo = self.factory.connect(kind).await?;
        let outcome = self.iterate(repo.as_ref()).await;
        match tokio::time::timeout(self.phase_timeout, repo.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(backend = %kind, error = %e, "Error closing benchmark adapter"),
            Err(_) => warn!(backend = %kind, "Closing benchmark adapter timed out"),
        }

        let timings = outcome?;
        let n = timings.len() as f64;
        let mean = |f: fn(&IterationTimings) -> f64| timings.iter().map(f).sum::<f64>() / n;
        let total_notes_after_run = timings.last().map(|t| t.total_notes).unwrap_or_default();

        Ok(BenchmarkResult {
            backend: kind,
            insert_seconds: mean(|t| t.insert),
            lookup_seconds: mean(|t| t.lookup),
            search_seconds: mean(|t| t.search),
            total_notes_after_run,
            iterations: timings.len() as u32,
            generated_at: Utc::now(),
        })
    }

    async fn iterate(&self, repo: &dyn NoteRepository) -> Result<Vec<IterationTimings>> {
        let iterations = self.workload.iterations.max(1);
        let mut timings = Vec::with_capacity(iterations as usize);
        for iteration in 1..=iterations {
            let mut created = Vec::with_capacity(self.workload.note_count);
            let outcome = self.run_phases(repo, &mut created).await;
            let residual = self.cleanup(repo, &created).await;
            if residual > 0 {
                warn!(backend = %repo.kind(), residual, "Benchmark notes left behind");
            }
            let iteration_timings = outcome?;
            debug!(backend = %repo.kind(), iteration, ?iteration_timings, "Iteration done");
            timings.push(iteration_timings);
        }
        Ok(timings)
    }

    async fn run_phases(
        &self,
        repo: &dyn NoteRepository,
        created: &mut Vec<String>,
    ) -> Result<IterationTimings> {
        let insert = self.phase("insert", insert_phase(repo, &self.workload, created)).await?;
        let lookup = self.phase("lookup", lookup_phase(repo, created)).await?;
        let search = self.phase("search", search_phase(repo, &self.workload.search_queries)).await?;
        let total_notes = self.phase("stats", async { repo.stats().await.map(|s| s.total) }).await?;
        Ok(IterationTimings {
            insert,
            lookup,
            search,
            total_notes,
        })
    }

    /// Delete every id, retrying each failure once. Returns how many remain.
    ///
    /// Each attempt is bounded by the phase timeout. A retry that also times
    /// out means the backend stopped answering, so the rest are left as
    /// residual instead of waiting out one deadline per note.
    async fn cleanup(&self, repo: &dyn NoteRepository, ids: &[String]) -> usize {
        let mut residual = 0;
        for (done, id) in ids.iter().enumerate() {
            let Err(first) = self.phase("cleanup", repo.delete(id)).await else {
                continue;
            };
            debug!(id = %id, error = %first, "Cleanup delete failed, retrying");
            match self.phase("cleanup", repo.delete(id)).await {
                Ok(_) => {}
                Err(e @ NotesError::Timeout { .. }) => {
                    warn!(backend = %repo.kind(), error = %e, "Backend stopped answering during cleanup");
                    return residual + ids.len() - done;
                }
                Err(e) => {
                    warn!(backend = %repo.kind(), id = %id, error = %e, "Residual benchmark note");
                    residual += 1;
                }
            }
        }
        residual
    }

    async fn phase<T>(&self, name: &str, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.phase_timeout, fut)
            .await
            .map_err(|_| NotesError::timeout(format!("benchmark phase {}", name), self.phase_timeout))?
    }
}

async fn insert_phase(
    repo: &dyn NoteRepository,
    workload: &Workload,
    created: &mut Vec<String>,
) -> Result<f64> {
    let started = Instant::now();
    for draft in workload.drafts() {
        created.push(repo.create(&draft).await?);
    }
    Ok(started.elapsed().as_secs_f64())
}

async fn lookup_phase(repo: &dyn NoteRepository, ids: &[String]) -> Result<f64> {
    let started = Instant::now();
    for id in ids {
        repo.get(id).await?;
    }
    Ok(started.elapsed().as_secs_f64())
}

/// Mean time per query.
async fn search_phase(repo: &dyn NoteRepository, queries: &[String]) -> Result<f64> {
    if queries.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for query in queries {
        let started = Instant::now();
        let hits = repo.search(query, SearchScope::Both).await?;
        total += started.elapsed().as_secs_f64();
        debug!(backend = %repo.kind(), query = %query, hits = hits.len(), "Search query");
    }
    Ok(total / queries.len() as f64)
}

