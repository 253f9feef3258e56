// Training callbacks
// Best-model checkpointing, early stopping and learning-rate plateau control

use std::fs;
use std::path::{Path, PathBuf};

use crate::model::backend::TrainingError;

/// Writes the model to disk whenever validation accuracy strictly improves
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    path: PathBuf,
    best: Option<f32>,
}

impl ModelCheckpoint {
    pub fn new(path: PathBuf) -> Self {
        ModelCheckpoint { path, best: None }
    }

    /// Calls `encode` and writes its bytes when `accuracy` is a new best.
    /// Returns true if the model was written.
    pub fn observe<F>(&mut self, accuracy: f32, encode: F) -> Result<bool, TrainingError>
    where
        F: FnOnce() -> Result<Vec<u8>, TrainingError>,
    {
        let improved = self.best.map_or(true, |best| accuracy > best);
        if !improved {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, encode()?)?;

        self.best = Some(accuracy);
        log::debug!(
            "Checkpoint saved to {} (val_accuracy {:.4})",
            self.path.display(),
            accuracy
        );
        Ok(true)
    }

    pub fn best(&self) -> Option<f32> {
        self.best
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Early-stopping verdict for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// Monitored loss reached a new minimum
    Improved,
    /// No improvement yet, keep training
    Continue,
    /// Patience exhausted
    Stop,
}

/// Stops training when validation loss has not improved for `patience` epochs
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f32,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        EarlyStopping {
            patience,
            best: f32::INFINITY,
            wait: 0,
        }
    }

    pub fn update(&mut self, loss: f32) -> StopDecision {
        if loss < self.best {
            self.best = loss;
            self.wait = 0;
            return StopDecision::Improved;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            StopDecision::Stop
        } else {
            StopDecision::Continue
        }
    }

    pub fn best(&self) -> f32 {
        self.best
    }
}

/// Smallest loss decrease that counts as progress for the plateau detector
const PLATEAU_MIN_DELTA: f32 = 1e-4;

/// Multiplies the learning rate by `factor` after `patience` epochs
/// without validation-loss improvement, never going below `min_lr`
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f32,
    patience: usize,
    min_lr: f32,
    best: f32,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f32, patience: usize, min_lr: f32) -> Self {
        ReduceLrOnPlateau {
            factor,
            patience,
            min_lr,
            best: f32::INFINITY,
            wait: 0,
        }
    }

    /// Returns the learning rate to use for the next epoch
    pub fn update(&mut self, loss: f32, learning_rate: f32) -> f32 {
        if loss < self.best - PLATEAU_MIN_DELTA {
            self.best = loss;
            self.wait = 0;
            return learning_rate;
        }

        self.wait += 1;
        if self.wait < self.patience || learning_rate <= self.min_lr {
            return learning_rate;
        }

        self.wait = 0;
        let reduced = (learning_rate * self.factor).max(self.min_lr);
        log::info!(
            "Validation loss plateaued, learning rate {:.6} -> {:.6}",
            learning_rate,
            reduced
        );
        reduced
    }
}
