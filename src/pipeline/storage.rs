// Artifact storage
// Writes run outputs to the output directory and fingerprints them
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A file written by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: usize,
}

/// Create the output directory if missing
pub fn ensure_dir(dir: &Path) -> StorageResult<()> {
    fs::create_dir_all(dir).map_err(|source| StorageError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Write `data` to `dir/file_name` and return its path and SHA256 hash
pub fn store_file(dir: &Path, file_name: &str, data: &[u8]) -> StorageResult<StoredArtifact> {
    ensure_dir(dir)?;
    let file_path = dir.join(file_name);

    let io_err = |source: std::io::Error| StorageError::Io {
        path: file_path.clone(),
        source,
    };
    let mut file = fs::File::create(&file_path).map_err(io_err)?;
    file.write_all(data).map_err(io_err)?;

    Ok(StoredArtifact {
        sha256: calculate_sha256(data),
        bytes: data.len(),
        path: file_path,
    })
}

/// Serialize `value` as pretty JSON into `dir/file_name`
pub fn store_json<T: Serialize>(
    dir: &Path,
    file_name: &str,
    value: &T,
) -> StorageResult<StoredArtifact> {
    let data = serde_json::to_vec_pretty(value)?;
    store_file(dir, file_name, &data)
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
