// Training backend abstraction
// Narrow interface between the data pipeline and whatever trains the model

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ExportConfig, PipelineConfig};
use crate::data::types::{Dataset, Sequence};

/// Which artifact flavor to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportVariant {
    /// Full-precision weights
    Standard,

    /// Weights snapped to 8-bit integer levels for on-device inference
    Quantized,
}

impl ExportVariant {
    pub const ALL: [ExportVariant; 2] = [ExportVariant::Standard, ExportVariant::Quantized];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportVariant::Standard => "standard",
            ExportVariant::Quantized => "quantized",
        }
    }

    /// Artifact base name configured for this variant
    pub fn file_stem<'a>(&self, export: &'a ExportConfig) -> &'a str {
        match self {
            ExportVariant::Standard => &export.model_name,
            ExportVariant::Quantized => &export.quantized_model_name,
        }
    }
}

/// Output of a single classification
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Most likely class index
    pub class: usize,

    /// Probability of the selected class [0.0, 1.0]
    pub confidence: f32,

    /// Probabilities for every class, indexed by label
    pub probabilities: Vec<f32>,
}

/// Anything that can classify a sequence
pub trait TrainedModel {
    fn predict(&self, sequence: &Sequence) -> Prediction;

    /// Classify many sequences at once, in order
    fn predict_all(&self, sequences: &[&Sequence]) -> Vec<Prediction> {
        sequences.iter().map(|s| self.predict(s)).collect()
    }
}

/// Loss and accuracy over a dataset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean sparse categorical cross-entropy
    pub loss: f32,
    pub accuracy: f32,
}

/// Per-epoch training record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train: Metrics,
    pub validation: Metrics,
    pub learning_rate: f32,
}

/// Result of [`TrainingBackend::train`]
#[derive(Debug, Clone)]
pub struct TrainingOutcome<M> {
    pub model: M,
    pub history: Vec<EpochMetrics>,

    /// Epoch whose weights were kept
    pub best_epoch: usize,

    /// True when early stopping ended training before the epoch limit
    pub stopped_early: bool,
}

/// Errors raised while training
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Example shape {found:?} does not match {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Label {label} outside 0..{classes}")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("Checkpoint write failed: {0}")]
    CheckpointIo(#[from] std::io::Error),

    #[error("Checkpoint encoding failed: {0}")]
    CheckpointEncode(String),
}

/// Errors raised by a single export attempt. These never abort a run on
/// their own; the pipeline records them and tries the next variant.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Parameter tensor {0} holds non-finite values")]
    NonFiniteParameter(usize),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Variant {0:?} is not supported by this backend")]
    Unsupported(ExportVariant),
}

/// A trainer/exporter the pipeline can drive.
///
/// Implementations own model definition, optimization and serialization;
/// the pipeline only hands over prepared datasets and collects bytes.
pub trait TrainingBackend {
    type Model: TrainedModel;

    /// Short backend name for logs and summaries
    fn name(&self) -> &'static str;

    /// File extension for exported artifacts, without the dot
    fn artifact_extension(&self) -> &'static str;

    fn train(
        &mut self,
        train: &Dataset,
        validation: &Dataset,
        config: &PipelineConfig,
    ) -> Result<TrainingOutcome<Self::Model>, TrainingError>;

    fn export(&self, model: &Self::Model, variant: ExportVariant) -> Result<Vec<u8>, ExportError>;
}

/// Smallest probability used inside the log of the loss
const PROBABILITY_FLOOR: f32 = 1e-7;

/// Mean cross-entropy and accuracy of `model` over `dataset`.
/// An empty dataset yields zero loss and zero accuracy.
pub fn evaluate<M: TrainedModel + ?Sized>(model: &M, dataset: &Dataset) -> Metrics {
    if dataset.is_empty() {
        return Metrics::default();
    }

    let sequences: Vec<&Sequence> = dataset.iter().map(|e| &e.sequence).collect();
    let predictions = model.predict_all(&sequences);

    let mut loss = 0.0f64;
    let mut correct = 0usize;
    for (example, prediction) in dataset.iter().zip(predictions) {
        let p = prediction
            .probabilities
            .get(example.label)
            .copied()
            .unwrap_or(0.0)
            .max(PROBABILITY_FLOOR);
        loss -= (p as f64).ln();
        if prediction.class == example.label {
            correct += 1;
        }
    }

    let n = dataset.len() as f64;
    Metrics {
        loss: (loss / n) as f32,
        accuracy: (correct as f64 / n) as f32,
    }
}

/// Build a prediction from class probabilities
pub fn prediction_from_probabilities(probabilities: Vec<f32>) -> Prediction {
    let (class, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
            if p > best.1 {
                (i, p)
            } else {
                best
            }
        });

    Prediction {
        class,
        confidence: confidence.max(0.0),
        probabilities,
    }
}
