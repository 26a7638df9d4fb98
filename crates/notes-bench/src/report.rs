//! Renders harness results as JSON, an HTML comparison page and a metrics
//! exposition text file.
//!
//! All three renderings are built from the same `Report`, so they always
//! agree. Only backends that produced a result appear; a missing backend is
//! never shown as zero.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use notes_core::error::Result;
use notes_core::types::BenchmarkResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<BenchmarkResult>,
}

/// Paths of the files written by [`Report::write_artifacts`].
#[derive(Debug, Clone)]
pub struct ReportArtifacts {
    pub json: PathBuf,
    pub html: PathBuf,
    pub metrics: PathBuf,
}

/// Metric families in exposition order: (name, help, value).
const FAMILIES: [(&str, &str, fn(&BenchmarkResult) -> f64); 4] = [
    (
        "notes_backend_insert_seconds",
        "Mean wall time to insert the synthetic notes.",
        insert_seconds,
    ),
    (
        "notes_backend_lookup_seconds",
        "Mean wall time to fetch every synthetic note by id.",
        lookup_seconds,
    ),
    (
        "notes_backend_search_seconds",
        "Mean wall time of one search query.",
        search_seconds,
    ),
    (
        "notes_backend_total_notes",
        "Notes stored when the last iteration finished.",
        total_notes,
    ),
];

fn insert_seconds(r: &BenchmarkResult) -> f64 {
    r.insert_seconds
}

fn lookup_seconds(r: &BenchmarkResult) -> f64 {
    r.lookup_seconds
}

fn search_seconds(r: &BenchmarkResult) -> f64 {
    r.search_seconds
}

fn total_notes(r: &BenchmarkResult) -> f64 {
    r.total_notes_after_run as f64
}

const CHART_WIDTH: f64 = 480.0;
const BAR_HEIGHT: u32 = 14;

impl Report {
    pub fn new(results: Vec<BenchmarkResult>) -> Self {
        Self {
            generated_at: Utc::now(),
            results,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Prometheus-style text exposition, one gauge family per metric.
    pub fn to_metrics(&self) -> String {
        let mut out = String::new();
        for (name, help, value) in FAMILIES {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} gauge", name);
            for result in &self.results {
                let _ = writeln!(out, "{}{{backend=\"{}\"}} {}", name, result.backend, value(result));
            }
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut rows = String::new();
        for r in &self.results {
            let _ = writeln!(
                rows,
                "      <tr><td>{}</td><td>{:.6}</td><td>{:.6}</td><td>{:.6}</td><td>{}</td><td>{}</td></tr>",
                r.backend,
                r.insert_seconds,
                r.lookup_seconds,
                r.search_seconds,
                r.total_notes_after_run,
                r.iterations
            );
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Notes backend benchmark</title>
  <style>
    body {{ font-family: sans-serif; margin: 2rem; }}
    table {{ border-collapse: collapse; }}
    th, td {{ border: 1px solid #ccc; padding: 4px 10px; text-align: right; }}
    th:first-child, td:first-child {{ text-align: left; }}
  </style>
</head>
<body>
  <h1>Notes backend benchmark</h1>
  <p>Generated {generated}</p>
  <table>
    <thead>
      <tr><th>Backend</th><th>Insert (s)</th><th>Lookup (s)</th><th>Search (s)</th><th>Total notes</th><th>Iterations</th></tr>
    </thead>
    <tbody>
{rows}    </tbody>
  </table>
  <h2>Insert and lookup time</h2>
{chart}</body>
</html>
"#,
            generated = self.generated_at.to_rfc3339(),
            rows = rows,
            chart = self.bar_chart(),
        )
    }

    /// Inline SVG with an insert bar and a lookup bar per backend, scaled to
    /// the slowest value in the report.
    fn bar_chart(&self) -> String {
        let max = self
            .results
            .iter()
            .flat_map(|r| [r.insert_seconds, r.lookup_seconds])
            .fold(0.0_f64, f64::max);
        let scale = if max > 0.0 { CHART_WIDTH / max } else { 0.0 };
        let group = BAR_HEIGHT * 2 + 10;
        let height = group * self.results.len() as u32 + 10;

        let mut svg = format!(
            "  <svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
            CHART_WIDTH as u32 + 120,
            height
        );
        for (i, r) in self.results.iter().enumerate() {
            let y = i as u32 * group + 5;
            let _ = writeln!(
                svg,
                "    <text x=\"0\" y=\"{}\" font-size=\"12\">{}</text>",
                y + BAR_HEIGHT,
                r.backend
            );
            for (j, (seconds, colour)) in [(r.insert_seconds, "#4e79a7"), (r.lookup_seconds, "#f28e2b")]
                .into_iter()
                .enumerate()
            {
                let _ = writeln!(
                    svg,
                    "    <rect x=\"100\" y=\"{}\" width=\"{:.1}\" height=\"{}\" fill=\"{}\"><title>{:.6}s</title></rect>",
                    y + j as u32 * BAR_HEIGHT,
                    seconds * scale,
                    BAR_HEIGHT,
                    colour,
                    seconds
                );
            }
        }
        svg.push_str("  </svg>\n");
        svg
    }

    /// Write `benchmark_<timestamp>.{json,html,txt}` into `dir`, creating it
    /// if needed.
    pub fn write_artifacts(&self, dir: &Path) -> Result<ReportArtifacts> {
        std::fs::create_dir_all(dir)?;
        let stem = format!("benchmark_{}", self.generated_at.format("%Y%m%d_%H%M%S"));
        let artifacts = ReportArtifacts {
            json: dir.join(format!("{}.json", stem)),
            html: dir.join(format!("{}.html", stem)),
            metrics: dir.join(format!("{}.txt", stem)),
        };

        std::fs::write(&artifacts.json, self.to_json()?)?;
        std::fs::write(&artifacts.html, self.to_html())?;
        std::fs::write(&artifacts.metrics, self.to_metrics())?;

        info!(
            dir = %dir.display(),
            backends = self.results.len(),
            "Benchmark report written"
        );
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notes_core::types::BackendKind;

    fn result(backend: BackendKind, insert: f64) -> BenchmarkResult {
        BenchmarkResult {
            backend,
            insert_seconds: insert,
            lookup_seconds: insert / 2.0,
            search_seconds: 0.25,
            total_notes_after_run: 100,
            iterations: 3,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_metrics_one_family_per_name() {
        let report = Report::new(vec![
            result(BackendKind::Sqlite, 1.5),
            result(BackendKind::Progress, 0.5),
        ]);
        let text = report.to_metrics();

        assert_eq!(text.matches("# TYPE notes_backend_insert_seconds gauge").count(), 1);
        assert!(text.contains("notes_backend_insert_seconds{backend=\"sqlite\"} 1.5\n"));
        assert!(text.contains("notes_backend_lookup_seconds{backend=\"progress\"} 0.25\n"));
        assert!(text.contains("notes_backend_total_notes{backend=\"sqlite\"} 100\n"));
        let samples = text.lines().filter(|l| !l.starts_with('#')).count();
        assert_eq!(samples, 8);
    }

    #[test]
    fn test_json_preserves_order() {
        let report = Report::new(vec![
            result(BackendKind::Progress, 0.5),
            result(BackendKind::Sqlite, 1.5),
        ]);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert!(value["generated_at"].is_string());
        assert_eq!(value["results"][0]["backend"], "progress");
        assert_eq!(value["results"][1]["backend"], "sqlite");
    }

    #[test]
    fn test_html_has_row_per_result_only() {
        let report = Report::new(vec![result(BackendKind::Sqlite, 1.0)]);
        let html = report.to_html();
        assert_eq!(html.matches("<tr><td>").count(), 1);
        assert!(html.contains("<td>sqlite</td>"));
        assert!(!html.contains("<td>mongo</td>"));
        assert_eq!(html.matches("<rect").count(), 2);
    }

    #[test]
    fn test_empty_report_renders() {
        let report = Report::new(vec![]);
        assert!(!report.to_metrics().lines().any(|l| !l.starts_with('#')));
        assert!(report.to_html().contains("<tbody>"));
    }
}
