//! Benchmark harness: runs one synthetic workload against each backend and
//! renders the comparison as JSON, HTML and metrics text.

pub mod harness;
pub mod report;
pub mod workload;

pub use harness::BenchmarkHarness;
pub use report::{Report, ReportArtifacts};
pub use workload::Workload;
