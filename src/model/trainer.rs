// Burn training backend
// Mini-batch Adam training of the trick network, driven by the callbacks

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::PipelineConfig;
use crate::data::types::{Dataset, LabeledExample, Sequence};
use crate::model::backend::{
    evaluate, prediction_from_probabilities, EpochMetrics, ExportError, ExportVariant, Metrics,
    Prediction, TrainedModel, TrainingBackend, TrainingError, TrainingOutcome,
};
use crate::model::callbacks::{EarlyStopping, ModelCheckpoint, ReduceLrOnPlateau, StopDecision};
use crate::model::export::{encode_network, first_non_finite};
use crate::model::network::{TrickNet, TrickNetConfig};

/// CPU tensor backend
pub type CpuBackend = burn_ndarray::NdArray<f32>;

/// CPU backend with gradient tracking, used for training
pub type CpuTrainBackend = burn::backend::Autodiff<CpuBackend>;

/// Sequences per forward pass when predicting
const PREDICT_BATCH: usize = 256;

/// Matches the epsilon of the reference Adam optimizer
const ADAM_EPSILON: f32 = 1e-7;

/// Stack sequences into a `[batch, timesteps, features]` tensor
fn stack_sequences<B: Backend>(sequences: &[&Sequence], device: &B::Device) -> Tensor<B, 3> {
    let (timesteps, features) = sequences
        .first()
        .map(|s| (s.timesteps(), s.features()))
        .unwrap_or((0, 0));

    let mut values = Vec::with_capacity(sequences.len() * timesteps * features);
    for sequence in sequences {
        values.extend_from_slice(sequence.values());
    }
    Tensor::from_data(
        TensorData::new(values, [sequences.len(), timesteps, features]),
        device,
    )
}

fn stack_labels<B: Backend>(examples: &[&LabeledExample], device: &B::Device) -> Tensor<B, 1, Int> {
    let labels: Vec<i64> = examples.iter().map(|e| e.label as i64).collect();
    Tensor::from_data(TensorData::new(labels, [examples.len()]), device)
}

/// A trained network ready for inference
#[derive(Debug, Clone)]
pub struct TrickClassifier<B: Backend> {
    network: TrickNet<B>,
    device: B::Device,
}

impl<B: Backend> TrickClassifier<B> {
    pub fn new(network: TrickNet<B>, device: B::Device) -> Self {
        TrickClassifier { network, device }
    }

    pub fn network(&self) -> &TrickNet<B> {
        &self.network
    }
}

impl<B: Backend> TrainedModel for TrickClassifier<B> {
    fn predict(&self, sequence: &Sequence) -> Prediction {
        self.predict_all(&[sequence])
            .pop()
            .unwrap_or_else(|| prediction_from_probabilities(Vec::new()))
    }

    fn predict_all(&self, sequences: &[&Sequence]) -> Vec<Prediction> {
        let mut predictions = Vec::with_capacity(sequences.len());
        for chunk in sequences.chunks(PREDICT_BATCH) {
            let input = stack_sequences::<B>(chunk, &self.device);
            let probabilities: Vec<f32> = self
                .network
                .probabilities(input)
                .into_data()
                .iter::<f32>()
                .collect();

            let classes = (probabilities.len() / chunk.len()).max(1);
            predictions.extend(
                probabilities
                    .chunks(classes)
                    .map(|row| prediction_from_probabilities(row.to_vec())),
            );
        }
        predictions
    }
}

/// Trains [`TrickNet`] with Adam on sparse categorical cross-entropy
pub struct BurnBackend<B: AutodiffBackend> {
    device: B::Device,
    rng: StdRng,
}

impl<B: AutodiffBackend> BurnBackend<B> {
    /// Seeded for reproducible batch order and weight init, or from OS entropy
    pub fn new(device: B::Device, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => {
                B::seed(seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_os_rng(),
        };
        BurnBackend { device, rng }
    }

    /// Network layout for the configured data shape
    pub fn network_config(config: &PipelineConfig) -> TrickNetConfig {
        TrickNetConfig::new(config.data.features, config.data.classes)
    }
}

impl<B: AutodiffBackend> Default for BurnBackend<B> {
    fn default() -> Self {
        Self::new(B::Device::default(), None)
    }
}

fn check_examples(
    examples: &Dataset,
    expected: (usize, usize),
    classes: usize,
) -> Result<(), TrainingError> {
    for example in examples.iter() {
        let found = (example.sequence.timesteps(), example.sequence.features());
        if found != expected {
            return Err(TrainingError::ShapeMismatch { expected, found });
        }
        if example.label >= classes {
            return Err(TrainingError::LabelOutOfRange {
                label: example.label,
                classes,
            });
        }
    }
    Ok(())
}

impl<B: AutodiffBackend> TrainingBackend for BurnBackend<B> {
    type Model = TrickClassifier<B::InnerBackend>;

    fn name(&self) -> &'static str {
        "burn-cnn-lstm"
    }

    fn artifact_extension(&self) -> &'static str {
        "bin"
    }

    fn train(
        &mut self,
        train: &Dataset,
        validation: &Dataset,
        config: &PipelineConfig,
    ) -> Result<TrainingOutcome<Self::Model>, TrainingError> {
        if train.is_empty() {
            return Err(TrainingError::EmptyTrainingSet);
        }
        let classes = config.data.classes;
        let expected = (config.data.timesteps, config.data.features);
        check_examples(train, expected, classes)?;
        check_examples(validation, expected, classes)?;

        let training = &config.training;
        let mut network: TrickNet<B> = Self::network_config(config).init(&self.device);
        let mut optimizer = AdamConfig::new().with_epsilon(ADAM_EPSILON).init();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);

        // Monitoring falls back to the training split when there is no validation data
        let monitor = if validation.is_empty() { train } else { validation };

        let mut checkpoint = ModelCheckpoint::new(config.export.checkpoint_path());
        let mut stopper = EarlyStopping::new(training.early_stopping_patience.max(1));
        let mut plateau = ReduceLrOnPlateau::new(
            training.lr_plateau_factor,
            training.lr_plateau_patience.max(1),
            training.min_learning_rate,
        );

        let mut learning_rate = training.learning_rate;
        let mut history = Vec::with_capacity(training.epochs);
        let mut best = (TrickClassifier::new(network.valid(), self.device.clone()), 0usize);
        let mut stopped_early = false;
        let mut order: Vec<&LabeledExample> = train.iter().collect();

        for epoch in 1..=training.epochs {
            order.shuffle(&mut self.rng);

            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;
            for batch in order.chunks(training.batch_size.max(1)) {
                let sequences: Vec<&Sequence> = batch.iter().map(|e| &e.sequence).collect();
                let inputs = stack_sequences::<B>(&sequences, &self.device);
                let targets = stack_labels::<B>(batch, &self.device);

                let logits = network.forward(inputs);
                correct += logits
                    .clone()
                    .argmax(1)
                    .into_data()
                    .iter::<i64>()
                    .zip(batch.iter())
                    .filter(|(class, example)| *class == example.label as i64)
                    .count();

                let loss = loss_fn.forward(logits, targets);
                let batch_loss: f64 = loss.clone().into_scalar().elem();
                loss_sum += batch_loss * batch.len() as f64;

                let grads = GradientsParams::from_grads(loss.backward(), &network);
                network = optimizer.step(learning_rate as f64, network, grads);
            }

            let train_metrics = Metrics {
                loss: (loss_sum / train.len() as f64) as f32,
                accuracy: correct as f32 / train.len() as f32,
            };
            let classifier = TrickClassifier::new(network.valid(), self.device.clone());
            let val_metrics = evaluate(&classifier, monitor);
            history.push(EpochMetrics {
                epoch,
                train: train_metrics,
                validation: val_metrics,
                learning_rate,
            });

            log::info!(
                "Epoch {}/{}: loss {:.4} acc {:.4} val_loss {:.4} val_acc {:.4} lr {:.5}",
                epoch,
                training.epochs,
                train_metrics.loss,
                train_metrics.accuracy,
                val_metrics.loss,
                val_metrics.accuracy,
                learning_rate
            );

            checkpoint.observe(val_metrics.accuracy, || {
                encode_network(classifier.network(), ExportVariant::Standard)
                    .map_err(|e| TrainingError::CheckpointEncode(format!("{:?}", e)))
            })?;

            match stopper.update(val_metrics.loss) {
                StopDecision::Improved => best = (classifier, epoch),
                StopDecision::Continue => {}
                StopDecision::Stop => {
                    log::info!(
                        "Early stopping at epoch {} (best val_loss {:.4} at epoch {})",
                        epoch,
                        stopper.best(),
                        best.1
                    );
                    stopped_early = true;
                    break;
                }
            }

            learning_rate = plateau.update(val_metrics.loss, learning_rate);
        }

        if let Some(accuracy) = checkpoint.best() {
            log::debug!(
                "Best checkpoint at {} (val_accuracy {:.4})",
                checkpoint.path().display(),
                accuracy
            );
        }

        let (model, best_epoch) = best;
        Ok(TrainingOutcome {
            model,
            history,
            best_epoch,
            stopped_early,
        })
    }

    fn export(&self, model: &Self::Model, variant: ExportVariant) -> Result<Vec<u8>, ExportError> {
        if let Some(index) = first_non_finite(model.network()) {
            return Err(ExportError::NonFiniteParameter(index));
        }
        encode_network(model.network(), variant)
            .map_err(|e| ExportError::Encode(format!("{:?}", e)))
    }
}
