// Training run driver
// load -> augment -> split -> train -> evaluate -> export, one stage at a time

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::augment::Augmenter;
use crate::config::{ConfigError, PipelineConfig};
use crate::data::{load_directory, stratified_split, DataError, LoadReport};
use crate::model::{
    evaluate, EpochMetrics, ExportVariant, Metrics, TrainingBackend, TrainingError,
};
use crate::pipeline::storage::{self, StorageError, StoredArtifact};
use crate::pipeline::trace::{Stage, TraceEntry, TraceError, TraceWriter};

/// File name of the run summary written next to the artifacts
pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Training failed: {0}")]
    Training(#[from] TrainingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("All {} export variants failed", .0.len())]
    AllExportsFailed(Vec<ExportOutcome>),
}

/// Result of one export attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub variant: ExportVariant,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<StoredArtifact>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportOutcome {
    pub fn succeeded(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Example counts at each stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSizes {
    pub original: usize,
    pub augmented: usize,
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

/// Everything a run produced, serialized to [`SUMMARY_FILE`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub backend: String,
    pub config: PipelineConfig,
    pub load: LoadReport,

    /// Trick names in class-index order
    pub labels: Vec<String>,

    pub sizes: DatasetSizes,
    pub history: Vec<EpochMetrics>,
    pub best_epoch: usize,
    pub stopped_early: bool,
    pub test: Metrics,
    pub exports: Vec<ExportOutcome>,
}

impl RunSummary {
    pub fn successful_exports(&self) -> impl Iterator<Item = &ExportOutcome> {
        self.exports.iter().filter(|e| e.succeeded())
    }
}

/// Run the whole training pipeline with `backend`.
///
/// Structural data problems abort before any training happens and before
/// anything is written to the output directory. Export failures are
/// recorded per variant; the run only fails when no variant could be
/// exported.
pub fn run_pipeline<B: TrainingBackend>(
    config: &PipelineConfig,
    backend: &mut B,
) -> Result<RunSummary, PipelineError> {
    config.validate()?;

    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let output_dir = &config.export.output_dir;
    let trace = TraceWriter::new(config.export.trace_path(), run_id);
    let mut rng = match config.training.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let classes = config.data.classes;

    log::info!("Run {} using {} backend", run_id, backend.name());

    let load_started = TraceEntry::new(
        run_id,
        Stage::Load,
        0.0,
        format!("Loading logs from {}", config.data.dir.display()),
    );
    let loaded = load_directory(&config.data.dir, &config.data)?;

    storage::ensure_dir(output_dir)?;
    trace.write(&load_started)?;
    trace.complete(
        Stage::Load,
        "Loaded sequences",
        json!({
            "files": loaded.report.file_count(),
            "skipped_lines": loaded.report.total_skipped_lines(),
            "degenerate_files": loaded.report.degenerate_files().len(),
            "labels": loaded.label_map.names(),
        }),
    )?;

    trace.start(Stage::Augment, format!("Augmenting x{}", config.augment.factor))?;
    let augmenter = Augmenter::new(config.augment.clone());
    let (augmented, stats) = augmenter.augment(&loaded.dataset, &mut rng);
    trace.complete(
        Stage::Augment,
        "Augmented dataset",
        json!({
            "examples": augmented.len(),
            "shifted": stats.shifted,
            "dropouts": stats.dropouts,
        }),
    )?;

    trace.start(Stage::Split, "Stratified split")?;
    let test_fraction = config.training.test_fraction;
    let test_split = stratified_split(&augmented, test_fraction, classes, &mut rng);
    let val_split = stratified_split(
        &test_split.kept,
        config.training.validation_fraction,
        classes,
        &mut rng,
    );
    let (train, validation, test) = (val_split.kept, val_split.held_out, test_split.held_out);
    let sizes = DatasetSizes {
        original: loaded.dataset.len(),
        augmented: augmented.len(),
        train: train.len(),
        validation: validation.len(),
        test: test.len(),
    };
    log::info!(
        "Training samples: {}, validation: {}, test: {}",
        sizes.train,
        sizes.validation,
        sizes.test
    );
    trace.complete(Stage::Split, "Split dataset", json!(sizes))?;

    trace.start(Stage::Train, format!("Training for up to {} epochs", config.training.epochs))?;
    let outcome = backend.train(&train, &validation, config)?;
    trace.complete(
        Stage::Train,
        "Training finished",
        json!({
            "epochs_run": outcome.history.len(),
            "best_epoch": outcome.best_epoch,
            "stopped_early": outcome.stopped_early,
        }),
    )?;

    trace.start(Stage::Evaluate, "Evaluating on held-out test split")?;
    let test_metrics = evaluate(&outcome.model, &test);
    log::info!(
        "Test accuracy: {:.2} (loss {:.4})",
        test_metrics.accuracy,
        test_metrics.loss
    );
    trace.complete(Stage::Evaluate, "Evaluated", json!(test_metrics))?;

    trace.start(Stage::Export, "Exporting model variants")?;
    let labels_file = format!("{}.labels.json", config.export.model_name);
    storage::store_json(output_dir, &labels_file, &loaded.label_map.names())?;

    let mut exports = Vec::with_capacity(ExportVariant::ALL.len());
    for variant in ExportVariant::ALL {
        let file_name = format!(
            "{}.{}",
            variant.file_stem(&config.export),
            backend.artifact_extension()
        );
        let result = backend
            .export(&outcome.model, variant)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                storage::store_file(output_dir, &file_name, &bytes).map_err(|e| e.to_string())
            });

        let export = match result {
            Ok(artifact) => {
                log::info!(
                    "{} model saved as {} ({} bytes)",
                    variant.as_str(),
                    artifact.path.display(),
                    artifact.bytes
                );
                ExportOutcome {
                    variant,
                    artifact: Some(artifact),
                    error: None,
                }
            }
            Err(error) => {
                log::warn!("{} conversion failed: {}", variant.as_str(), error);
                ExportOutcome {
                    variant,
                    artifact: None,
                    error: Some(error),
                }
            }
        };
        exports.push(export);
    }
    trace.complete(Stage::Export, "Export finished", json!(exports))?;

    let summary = RunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        backend: backend.name().to_string(),
        config: config.clone(),
        load: loaded.report,
        labels: loaded.label_map.names().to_vec(),
        sizes,
        history: outcome.history,
        best_epoch: outcome.best_epoch,
        stopped_early: outcome.stopped_early,
        test: test_metrics,
        exports,
    };
    storage::store_json(output_dir, SUMMARY_FILE, &summary)?;

    if summary.successful_exports().next().is_none() {
        return Err(PipelineError::AllExportsFailed(summary.exports));
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, Sequence};
    use crate::model::backend::prediction_from_probabilities;
    use crate::model::{
        decode_network, BurnBackend, CpuBackend, CpuTrainBackend, ExportError, Prediction,
        TrainedModel, TrainingOutcome,
    };
    use crate::pipeline::trace::read_trace_file;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Writes `rows` CSV lines whose pitch oscillates with a trick-specific period
    fn write_trick(dir: &Path, name: &str, period: f32, rows: usize) {
        let mut contents = String::new();
        for i in 0..rows {
            let phase = i as f32 / period;
            contents.push_str(&format!(
                "{},{:.3},{:.3},{:.3},{:.3},0,0\n",
                i * 20,
                30.0 * phase.sin(),
                10.0 * phase.cos(),
                period,
                1.0 + 0.1 * phase.sin()
            ));
        }
        fs::write(dir.join(name), contents).unwrap();
    }

    fn trick_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        for n in 1..=3 {
            write_trick(dir.path(), &format!("ollie_{}.txt", n), 4.0, 40);
            write_trick(dir.path(), &format!("manual_{}.txt", n), 12.0, 40);
            write_trick(dir.path(), &format!("bunnyhop_{}.txt", n), 40.0, 40);
        }
        dir
    }

    fn small_config(data: &TempDir, out: &TempDir) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.data.dir = data.path().to_path_buf();
        config.data.timesteps = 50;
        config.augment.factor = 4;
        config.training.epochs = 3;
        config.training.seed = Some(1234);
        config.export.output_dir = out.path().to_path_buf();
        config
    }

    #[test]
    fn test_end_to_end_writes_both_artifacts() {
        let data = trick_dir();
        let out = TempDir::new().unwrap();
        let config = small_config(&data, &out);
        let mut backend =
            BurnBackend::<CpuTrainBackend>::new(Default::default(), config.training.seed);

        let summary = run_pipeline(&config, &mut backend).unwrap();

        assert_eq!(summary.labels, vec!["bunnyhop", "manual", "ollie"]);
        assert_eq!(summary.sizes.original, 9);
        assert_eq!(summary.sizes.augmented, 9 * 5);
        assert_eq!(
            summary.sizes.train + summary.sizes.validation + summary.sizes.test,
            45
        );
        assert_eq!(summary.exports.len(), 2);
        assert!(summary.exports.iter().all(|e| e.succeeded()));

        assert_eq!(summary.backend, "burn-cnn-lstm");
        assert!(summary.history.len() <= 3);

        let device = Default::default();
        let network_config = BurnBackend::<CpuTrainBackend>::network_config(&config);
        for (variant, file) in [
            (ExportVariant::Standard, "trick_detector_compatible.bin"),
            (ExportVariant::Quantized, "trick_detector_compatible_quant.bin"),
        ] {
            let bytes = fs::read(out.path().join(file)).unwrap();
            let stored = summary
                .exports
                .iter()
                .find(|e| e.variant == variant)
                .and_then(|e| e.artifact.as_ref())
                .unwrap();
            assert_eq!(stored.sha256, storage::calculate_sha256(&bytes));
            assert!(decode_network::<CpuBackend>(&network_config, bytes, variant, &device).is_ok());
        }

        assert!(out.path().join("best_compatible_model.bin").exists());
        assert!(out.path().join(SUMMARY_FILE).exists());
        let labels: Vec<String> = serde_json::from_slice(
            &fs::read(out.path().join("trick_detector_compatible.labels.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(labels, summary.labels);

        let trace = read_trace_file(&config.export.trace_path()).unwrap();
        assert_eq!(trace.len(), 12);
        assert!(trace.iter().all(|e| e.run_id == summary.run_id));
    }

    /// Records whether training was reached; can be told to fail exports
    struct StubBackend {
        trained: bool,
        fail: Vec<ExportVariant>,
    }

    struct ConstantModel;

    impl TrainedModel for ConstantModel {
        fn predict(&self, _sequence: &Sequence) -> Prediction {
            prediction_from_probabilities(vec![1.0, 0.0, 0.0])
        }
    }

    impl TrainingBackend for StubBackend {
        type Model = ConstantModel;

        fn name(&self) -> &'static str {
            "stub"
        }

        fn artifact_extension(&self) -> &'static str {
            "bin"
        }

        fn train(
            &mut self,
            _train: &Dataset,
            _validation: &Dataset,
            _config: &PipelineConfig,
        ) -> Result<TrainingOutcome<ConstantModel>, TrainingError> {
            self.trained = true;
            Ok(TrainingOutcome {
                model: ConstantModel,
                history: Vec::new(),
                best_epoch: 0,
                stopped_early: false,
            })
        }

        fn export(
            &self,
            _model: &ConstantModel,
            variant: ExportVariant,
        ) -> Result<Vec<u8>, ExportError> {
            if self.fail.contains(&variant) {
                Err(ExportError::Unsupported(variant))
            } else {
                Ok(vec![1, 2, 3])
            }
        }
    }

    fn stub(fail: Vec<ExportVariant>) -> StubBackend {
        StubBackend {
            trained: false,
            fail,
        }
    }

    #[test]
    fn test_missing_data_aborts_before_training() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let config = small_config(&data, &out);
        let mut backend = stub(Vec::new());

        let result = run_pipeline(&config, &mut backend);

        assert!(matches!(
            result,
            Err(PipelineError::Data(DataError::DataAbsent { .. }))
        ));
        assert!(!backend.trained);
    }

    #[test]
    fn test_failed_load_writes_nothing() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let mut config = small_config(&data, &out);
        config.data.dir = data.path().join("missing");
        config.export.output_dir = out.path().join("run");
        let mut backend = stub(Vec::new());

        let result = run_pipeline(&config, &mut backend);

        assert!(matches!(
            result,
            Err(PipelineError::Data(DataError::DataAbsent { .. }))
        ));
        assert!(!config.export.output_dir.exists());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_wrong_class_count_aborts_before_training() {
        let data = TempDir::new().unwrap();
        write_trick(data.path(), "ollie_1.txt", 4.0, 10);
        write_trick(data.path(), "manual_1.txt", 8.0, 10);
        let out = TempDir::new().unwrap();
        let config = small_config(&data, &out);
        let mut backend = stub(Vec::new());

        let result = run_pipeline(&config, &mut backend);

        assert!(matches!(
            result,
            Err(PipelineError::Data(DataError::LabelCardinality { .. }))
        ));
        assert!(!backend.trained);
    }

    #[test]
    fn test_one_failed_export_is_soft() {
        let data = trick_dir();
        let out = TempDir::new().unwrap();
        let config = small_config(&data, &out);
        let mut backend = stub(vec![ExportVariant::Quantized]);

        let summary = run_pipeline(&config, &mut backend).unwrap();

        assert_eq!(summary.successful_exports().count(), 1);
        let failed = summary.exports.iter().find(|e| !e.succeeded()).unwrap();
        assert_eq!(failed.variant, ExportVariant::Quantized);
        assert!(failed.error.as_ref().unwrap().contains("not supported"));
        assert!(out.path().join("trick_detector_compatible.bin").exists());
        assert!(!out.path().join("trick_detector_compatible_quant.bin").exists());
    }

    #[test]
    fn test_all_exports_failing_fails_run() {
        let data = trick_dir();
        let out = TempDir::new().unwrap();
        let config = small_config(&data, &out);
        let mut backend = stub(ExportVariant::ALL.to_vec());

        let result = run_pipeline(&config, &mut backend);

        match result {
            Err(PipelineError::AllExportsFailed(outcomes)) => {
                assert_eq!(outcomes.len(), 2);
                assert!(outcomes.iter().all(|o| o.error.is_some()));
            }
            other => panic!("expected all exports to fail, got {:?}", other.map(|_| ())),
        }
        assert!(out.path().join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let data = trick_dir();
        let out = TempDir::new().unwrap();
        let mut config = small_config(&data, &out);
        config.data.features = 3;
        let mut backend = stub(Vec::new());

        let result = run_pipeline(&config, &mut backend);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
