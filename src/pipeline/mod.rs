// Pipeline execution and monitoring module
// Drives a full training run and records what it produced

pub mod run;
pub mod storage;
pub mod trace;

pub use run::{run_pipeline, DatasetSizes, ExportOutcome, PipelineError, RunSummary, SUMMARY_FILE};
pub use storage::{calculate_sha256, StorageError, StoredArtifact};
pub use trace::{read_trace_file, Stage, TraceEntry, TraceError, TraceWriter};
