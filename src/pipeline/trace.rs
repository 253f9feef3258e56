// Pipeline progress tracing
// Append-only JSONL trace of the stages of one training run

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Augment,
    Split,
    Train,
    Evaluate,
    Export,
}

/// A single trace entry in the run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp of when this entry was created
    pub timestamp: String,

    /// Run this entry belongs to
    pub run_id: Uuid,

    pub stage: Stage,

    /// Stage progress [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Optional structured data (counts, metrics, artifact hashes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(run_id: Uuid, stage: Stage, progress: f32, message: String) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id,
            stage,
            progress: progress.clamp(0.0, 1.0),
            message,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries for one run to a JSONL file
pub struct TraceWriter {
    file_path: PathBuf,
    run_id: Uuid,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf, run_id: Uuid) -> Self {
        TraceWriter { file_path, run_id }
    }

    /// Append a trace entry, creating the file if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        let json_line = entry.to_json_line()?;
        file.write_all(json_line.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Record the start of a stage
    pub fn start(&self, stage: Stage, message: impl Into<String>) -> Result<(), TraceError> {
        self.write(&TraceEntry::new(self.run_id, stage, 0.0, message.into()))
    }

    /// Record the completion of a stage with structured results
    pub fn complete(
        &self,
        stage: Stage,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<(), TraceError> {
        let entry = TraceEntry::new(self.run_id, stage, 1.0, message.into()).with_data(data);
        self.write(&entry)
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let entry: TraceEntry = serde_json::from_str(line)?;
        entries.push(entry);
    }

    Ok(entries)
}
