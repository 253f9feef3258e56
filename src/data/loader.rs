// Sequence loader
// Reads per-trick sensor logs from a directory into fixed-length labeled sequences

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::DataConfig;
use crate::data::types::{Dataset, LabelMap, LabeledExample, RawSample, Sequence};
use crate::data::DataError;

/// Extension of the log files picked up from the data directory
const LOG_EXTENSION: &str = "txt";

/// Per-file outcome of a load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,

    /// Trick name derived from the filename
    pub trick: String,

    /// Lines that parsed into a reading
    pub usable_rows: usize,

    /// Non-empty lines that did not match the schema
    pub skipped_lines: usize,

    /// Rows appended by repeating the last reading (or zeros)
    pub padded_rows: usize,

    /// Readings dropped past the configured timestep count
    pub truncated_rows: usize,
}

impl FileReport {
    /// A file with no usable rows still contributes an all-zero sequence
    pub fn is_degenerate(&self) -> bool {
        self.usable_rows == 0
    }
}

/// Summary of a directory load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadReport {
    pub files: Vec<FileReport>,
}

impl LoadReport {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_skipped_lines(&self) -> usize {
        self.files.iter().map(|f| f.skipped_lines).sum()
    }

    pub fn degenerate_files(&self) -> Vec<&Path> {
        self.files
            .iter()
            .filter(|f| f.is_degenerate())
            .map(|f| f.path.as_path())
            .collect()
    }
}

/// Output of [`load_directory`]
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub dataset: Dataset,
    pub label_map: LabelMap,
    pub report: LoadReport,
}

/// Trick name from a log filename.
///
/// `ollie_3.txt` -> `ollie`, `manual.txt` -> `manual`.
pub fn label_from_filename(file_name: &str) -> String {
    match file_name.split_once('_') {
        Some((prefix, _)) => prefix.to_string(),
        None => file_name
            .strip_suffix(".txt")
            .unwrap_or(file_name)
            .to_string(),
    }
}

/// List `*.txt` files directly inside `dir`, in sorted order.
/// A missing directory yields no files.
pub fn discover_log_files(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(DataError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DataError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_log = path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(LOG_EXTENSION);
        if is_log {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Parse one log file's raw bytes into readings.
/// Returns the readings and the number of malformed non-empty lines;
/// lines that are not valid UTF-8 count as malformed.
pub fn parse_log(contents: &[u8], config: &DataConfig) -> (Vec<RawSample>, usize) {
    let mut samples = Vec::new();
    let mut skipped = 0;

    for raw in contents.split(|b| *b == b'\n') {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let Ok(line) = std::str::from_utf8(raw) else {
            skipped += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match config.schema.parse_line(line) {
            Some(sample) => samples.push(sample),
            None => skipped += 1,
        }
    }

    (samples, skipped)
}

/// Load every log file in `dir` into a labeled dataset.
///
/// Fails when the directory holds no log files, when none of the files has
/// a single usable row, or when the number of distinct tricks is not
/// `config.classes`. Individual malformed lines and empty files are not
/// errors; they are counted in the returned [`LoadReport`].
pub fn load_directory(dir: &Path, config: &DataConfig) -> Result<LoadedData, DataError> {
    let files = discover_log_files(dir)?;
    if files.is_empty() {
        return Err(DataError::DataAbsent {
            dir: dir.to_path_buf(),
        });
    }

    let mut sequences = Vec::with_capacity(files.len());
    let mut report = LoadReport::default();

    for path in files {
        let contents = fs::read(&path).map_err(|source| DataError::Io {
            path: path.clone(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let trick = label_from_filename(&file_name);

        let (samples, skipped_lines) = parse_log(&contents, config);
        let usable_rows = samples.len();
        let padded_rows = config.timesteps.saturating_sub(usable_rows);
        let truncated_rows = usable_rows.saturating_sub(config.timesteps);

        if skipped_lines > 0 {
            log::debug!("{}: skipped {} malformed lines", path.display(), skipped_lines);
        }
        if usable_rows == 0 {
            log::warn!(
                "{}: no usable rows, contributing an all-zero sequence",
                path.display()
            );
        }

        sequences.push((
            trick.clone(),
            Sequence::from_samples(&samples, config.timesteps, config.features),
        ));
        report.files.push(FileReport {
            path,
            trick,
            usable_rows,
            skipped_lines,
            padded_rows,
            truncated_rows,
        });
    }

    if report.files.iter().all(FileReport::is_degenerate) {
        return Err(DataError::NoUsableRows {
            dir: dir.to_path_buf(),
            files: report.file_count(),
        });
    }

    let label_map = LabelMap::from_names(
        sequences.iter().map(|(trick, _)| trick.as_str()),
        config.classes,
    )?;

    let mut dataset = Dataset::default();
    for (trick, sequence) in sequences {
        let label = label_map
            .index_of(&trick)
            .ok_or_else(|| DataError::UnknownLabel(trick.clone()))?;
        dataset.push(LabeledExample::new(sequence, label));
    }

    log::info!(
        "Loaded {} sequences from {} ({} skipped lines, {} degenerate files)",
        dataset.len(),
        dir.display(),
        report.total_skipped_lines(),
        report.degenerate_files().len()
    );

    Ok(LoadedData {
        dataset,
        label_map,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SchemaVariant;
    use std::fs;
    use tempfile::TempDir;

    fn write_rows(dir: &Path, name: &str, rows: usize) {
        let mut contents = String::new();
        for i in 0..rows {
            contents.push_str(&format!(
                "{},{}.0,{}.5,{}.25,1.0,0,0\n",
                i * 20,
                i,
                i,
                i
            ));
        }
        fs::write(dir.join(name), contents).unwrap();
    }

    fn csv_config(timesteps: usize) -> DataConfig {
        DataConfig {
            timesteps,
            ..DataConfig::csv()
        }
    }

    #[test]
    fn test_label_from_filename() {
        assert_eq!(label_from_filename("ollie_1.txt"), "ollie");
        assert_eq!(label_from_filename("bunny_hop_2.txt"), "bunny");
        assert_eq!(label_from_filename("manual.txt"), "manual");
        assert_eq!(label_from_filename("noext"), "noext");
    }

    #[test]
    fn test_three_tricks_padded_and_labeled_alphabetically() {
        let temp_dir = TempDir::new().unwrap();
        write_rows(temp_dir.path(), "ollie_1.txt", 50);
        write_rows(temp_dir.path(), "manual_1.txt", 50);
        write_rows(temp_dir.path(), "bunnyhop_1.txt", 50);

        let loaded = load_directory(temp_dir.path(), &csv_config(100)).unwrap();

        assert_eq!(loaded.dataset.len(), 3);
        assert_eq!(loaded.label_map.index_of("bunnyhop"), Some(0));
        assert_eq!(loaded.label_map.index_of("manual"), Some(1));
        assert_eq!(loaded.label_map.index_of("ollie"), Some(2));

        // Sorted file order: bunnyhop, manual, ollie
        let labels: Vec<usize> = loaded.dataset.iter().map(|e| e.label).collect();
        assert_eq!(labels, vec![0, 1, 2]);

        for example in loaded.dataset.iter() {
            let seq = &example.sequence;
            assert_eq!(seq.timesteps(), 100);
            assert_eq!(seq.features(), 4);
            assert_eq!(seq.row(49), &[49.0, 49.5, 49.25, 1.0]);
            for t in 50..100 {
                assert_eq!(seq.row(t), seq.row(49));
            }
        }

        assert!(loaded.report.files.iter().all(|f| f.padded_rows == 50));
    }

    #[test]
    fn test_truncates_long_recordings() {
        let temp_dir = TempDir::new().unwrap();
        write_rows(temp_dir.path(), "a_1.txt", 30);
        write_rows(temp_dir.path(), "b_1.txt", 10);
        write_rows(temp_dir.path(), "c_1.txt", 10);

        let loaded = load_directory(temp_dir.path(), &csv_config(10)).unwrap();

        let first = &loaded.dataset.examples()[0].sequence;
        assert_eq!(first.timesteps(), 10);
        assert_eq!(first.row(9)[0], 9.0);
        assert_eq!(loaded.report.files[0].truncated_rows, 20);
    }

    #[test]
    fn test_empty_directory_is_data_absent() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.csv"), "0,1,2,3,4\n").unwrap();

        let result = load_directory(temp_dir.path(), &csv_config(100));
        assert!(matches!(result, Err(DataError::DataAbsent { .. })));
    }

    #[test]
    fn test_missing_directory_is_data_absent() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("no_such_dir");

        let result = load_directory(&missing, &csv_config(100));
        assert!(matches!(result, Err(DataError::DataAbsent { .. })));
    }

    #[test]
    fn test_wrong_trick_count_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_rows(temp_dir.path(), "ollie_1.txt", 5);
        write_rows(temp_dir.path(), "ollie_2.txt", 5);
        write_rows(temp_dir.path(), "manual_1.txt", 5);

        let result = load_directory(temp_dir.path(), &csv_config(10));
        assert!(matches!(result, Err(DataError::LabelCardinality { .. })));

        for name in ["bunnyhop_1.txt", "wheelie_1.txt"] {
            write_rows(temp_dir.path(), name, 5);
        }
        let result = load_directory(temp_dir.path(), &csv_config(10));
        match result {
            Err(DataError::LabelCardinality { expected, found }) => {
                assert_eq!(expected, 3);
                assert_eq!(found.len(), 4);
            }
            other => panic!("expected cardinality error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_malformed_lines_skipped_and_counted() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("ollie_1.txt"),
            "header,line\n0,1,2,3,4\n\ngarbage\n20,5,6,7,8,9\n",
        )
        .unwrap();
        write_rows(temp_dir.path(), "manual_1.txt", 3);
        write_rows(temp_dir.path(), "bunnyhop_1.txt", 3);

        let loaded = load_directory(temp_dir.path(), &csv_config(4)).unwrap();
        let ollie = loaded
            .report
            .files
            .iter()
            .find(|f| f.trick == "ollie")
            .unwrap();

        assert_eq!(ollie.usable_rows, 2);
        assert_eq!(ollie.skipped_lines, 2);
        assert_eq!(loaded.report.total_skipped_lines(), 2);
    }

    #[test]
    fn test_invalid_utf8_line_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let mut contents = b"0,1,2,3,4\n".to_vec();
        contents.extend_from_slice(&[0xff, 0xfe, b'\n']);
        contents.extend_from_slice(b"20,5,6,7,8\r\n");
        fs::write(temp_dir.path().join("ollie_1.txt"), contents).unwrap();
        write_rows(temp_dir.path(), "manual_1.txt", 3);
        write_rows(temp_dir.path(), "bunnyhop_1.txt", 3);

        let loaded = load_directory(temp_dir.path(), &csv_config(4)).unwrap();
        let ollie = loaded
            .report
            .files
            .iter()
            .find(|f| f.trick == "ollie")
            .unwrap();

        assert_eq!(ollie.usable_rows, 2);
        assert_eq!(ollie.skipped_lines, 1);
        let sequence = &loaded
            .dataset
            .iter()
            .find(|e| e.label == 2)
            .unwrap()
            .sequence;
        assert_eq!(sequence.row(1), &[5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_degenerate_file_contributes_zero_sequence() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("ollie.txt"), "nothing useful\n").unwrap();
        write_rows(temp_dir.path(), "manual_1.txt", 3);
        write_rows(temp_dir.path(), "bunnyhop_1.txt", 3);

        let loaded = load_directory(temp_dir.path(), &csv_config(5)).unwrap();

        assert_eq!(loaded.report.degenerate_files().len(), 1);
        let ollie = loaded
            .dataset
            .iter()
            .find(|e| e.label == 2)
            .unwrap();
        assert!(ollie.sequence.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_all_files_unusable_rejected() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            fs::write(temp_dir.path().join(name), "junk\n").unwrap();
        }

        let result = load_directory(temp_dir.path(), &csv_config(5));
        assert!(matches!(result, Err(DataError::NoUsableRows { files: 3, .. })));
    }

    #[test]
    fn test_imu_prefixed_schema() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["ollie.txt", "manual.txt", "bunnyhop.txt"] {
            fs::write(
                temp_dir.path().join(name),
                "BOOT ok\nIMU: 1.0, 2.0, 3.0\nIMU: 4.0, 5.0, 6.0\nHALL: 1\n",
            )
            .unwrap();
        }

        let config = DataConfig {
            schema: SchemaVariant::ImuPrefixed,
            timesteps: 4,
            features: 3,
            ..DataConfig::imu_prefixed()
        };
        let loaded = load_directory(temp_dir.path(), &config).unwrap();

        for example in loaded.dataset.iter() {
            assert_eq!(example.sequence.features(), 3);
            assert_eq!(example.sequence.row(3), &[4.0, 5.0, 6.0]);
        }
        assert!(loaded.report.files.iter().all(|f| f.skipped_lines == 2));
    }
}
