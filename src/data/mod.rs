// Data module
// Log schemas, sequence loading, label mapping and dataset splitting

pub mod loader;
pub mod schema;
pub mod split;
pub mod types;

use std::path::PathBuf;
use thiserror::Error;

pub use loader::{label_from_filename, load_directory, FileReport, LoadReport, LoadedData};
pub use schema::SchemaVariant;
pub use split::{stratified_split, Split};
pub use types::{Dataset, LabelMap, LabeledExample, RawSample, Sequence, CLASS_COUNT};

/// Structural problems with a log directory. Row-level problems are never
/// surfaced as errors, only counted in the load report.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("No .txt log files found in {}", dir.display())]
    DataAbsent { dir: PathBuf },

    #[error("None of the {files} log files in {} contained a usable row", dir.display())]
    NoUsableRows { dir: PathBuf, files: usize },

    #[error("Exactly {expected} trick classes required. Found: {found:?}")]
    LabelCardinality { expected: usize, found: Vec<String> },

    #[error("Trick {0:?} missing from label map")]
    UnknownLabel(String),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
