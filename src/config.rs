// Pipeline configuration
// One immutable value passed through load, augment, train and export

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::data::{SchemaVariant, CLASS_COUNT};

/// Top-level configuration for a training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub augment: AugmentConfig,
    pub training: TrainingConfig,
    pub export: ExportConfig,
}

/// Where the logs are and how to shape them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory scanned for `*.txt` logs
    pub dir: PathBuf,

    /// Line format of the logs
    pub schema: SchemaVariant,

    /// Rows per sequence after padding/truncation
    pub timesteps: usize,

    /// Columns per row; must match the schema
    pub features: usize,

    /// Distinct tricks expected in the directory
    pub classes: usize,
}

impl DataConfig {
    /// Current firmware: 220 rows (~2 s at 50 Hz) of pitch, roll, yaw, g-force
    pub fn csv() -> Self {
        DataConfig {
            dir: PathBuf::from("."),
            schema: SchemaVariant::Csv,
            timesteps: 220,
            features: 4,
            classes: CLASS_COUNT,
        }
    }

    /// Older firmware: 100 rows of pitch, roll, yaw
    pub fn imu_prefixed() -> Self {
        DataConfig {
            dir: PathBuf::from("."),
            schema: SchemaVariant::ImuPrefixed,
            timesteps: 100,
            features: 3,
            classes: CLASS_COUNT,
        }
    }

    /// Preset matching a schema
    pub fn for_schema(schema: SchemaVariant) -> Self {
        match schema {
            SchemaVariant::Csv => DataConfig::csv(),
            SchemaVariant::ImuPrefixed => DataConfig::imu_prefixed(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig::csv()
    }
}

/// Perturbation parameters for synthetic variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Synthetic variants generated per original example
    pub factor: usize,

    /// Std-dev of the noise added to every value
    pub sensor_noise_std: f32,

    /// Lower bound of the g-force gain
    pub gforce_scale_min: f32,

    /// Upper bound of the g-force gain
    pub gforce_scale_max: f32,

    /// Largest temporal shift in either direction, in rows
    pub max_shift: usize,

    /// Std-dev of the extra noise on pitch, roll and yaw
    pub orientation_noise_std: f32,

    /// Chance that a variant gets a dropout span
    pub dropout_probability: f64,

    /// Longest dropout span, in rows
    pub max_dropout_span: usize,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        AugmentConfig {
            factor: 8,
            sensor_noise_std: 0.02,
            gforce_scale_min: 0.9,
            gforce_scale_max: 1.1,
            max_shift: 10,
            orientation_noise_std: 1.0,
            dropout_probability: 0.3,
            max_dropout_span: 5,
        }
    }
}

/// Split, batching and monitoring parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub epochs: usize,

    /// Share of each class held out for the final evaluation
    pub test_fraction: f64,

    /// Share of each class of the training split used for monitoring
    pub validation_fraction: f64,

    pub learning_rate: f32,

    /// Epochs without validation-loss improvement before stopping
    pub early_stopping_patience: usize,

    /// Epochs without validation-loss improvement before the rate is cut
    pub lr_plateau_patience: usize,

    /// Multiplier applied to the rate on a plateau
    pub lr_plateau_factor: f32,

    pub min_learning_rate: f32,

    /// Fixed seed for splitting, shuffling and augmentation
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            batch_size: 32,
            epochs: 50,
            test_fraction: 0.2,
            validation_fraction: 0.15,
            learning_rate: 0.002,
            early_stopping_patience: 15,
            lr_plateau_patience: 8,
            lr_plateau_factor: 0.5,
            min_learning_rate: 1e-4,
            seed: None,
        }
    }
}

/// Artifact names and locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,

    /// Base name of the full-precision model
    pub model_name: String,

    /// Base name of the int8 model
    pub quantized_model_name: String,

    /// Base name of the best-validation-accuracy checkpoint
    pub checkpoint_name: String,

    /// File name of the JSONL stage trace
    pub trace_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            output_dir: PathBuf::from("."),
            model_name: "trick_detector_compatible".to_string(),
            quantized_model_name: "trick_detector_compatible_quant".to_string(),
            checkpoint_name: "best_compatible_model".to_string(),
            trace_name: "pipeline_trace.jsonl".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.bin", self.checkpoint_name))
    }

    pub fn trace_path(&self) -> PathBuf {
        self.output_dir.join(&self.trace_name)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl PipelineConfig {
    /// Load and validate a TOML configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this configuration as TOML
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let data = &self.data;
        // Two pooling stages halve the time axis twice
        if data.timesteps < 4 {
            return Err(invalid("timesteps must be at least 4"));
        }
        if data.features != data.schema.feature_count() {
            return Err(invalid(format!(
                "schema {} produces {} features, configured {}",
                data.schema.as_str(),
                data.schema.feature_count(),
                data.features
            )));
        }
        if data.classes != CLASS_COUNT {
            return Err(invalid(format!(
                "classes is fixed at {}, configured {}",
                CLASS_COUNT, data.classes
            )));
        }

        let augment = &self.augment;
        if !non_negative(augment.sensor_noise_std) || !non_negative(augment.orientation_noise_std) {
            return Err(invalid("noise standard deviations must be non-negative"));
        }
        let (min, max) = (augment.gforce_scale_min, augment.gforce_scale_max);
        if !(min > 0.0 && min <= max && max.is_finite()) {
            return Err(invalid("g-force scale band must be positive and ordered"));
        }
        if !(0.0..=1.0).contains(&augment.dropout_probability) {
            return Err(invalid("dropout probability must be within [0, 1]"));
        }

        let training = &self.training;
        if training.batch_size == 0 {
            return Err(invalid("batch size must be positive"));
        }
        for (name, fraction) in [
            ("test", training.test_fraction),
            ("validation", training.validation_fraction),
        ] {
            if !(0.0..1.0).contains(&fraction) {
                return Err(invalid(format!("{} fraction must be within [0, 1)", name)));
            }
        }
        if !(training.learning_rate > 0.0 && training.learning_rate.is_finite())
            || !non_negative(training.min_learning_rate)
        {
            return Err(invalid("learning rates must be positive"));
        }
        if !(training.lr_plateau_factor > 0.0 && training.lr_plateau_factor < 1.0) {
            return Err(invalid("plateau factor must be within (0, 1)"));
        }

        if self.export.model_name.is_empty() || self.export.quantized_model_name.is_empty() {
            return Err(invalid("model names must not be empty"));
        }

        Ok(())
    }
}

/// False for negative values, NaN and infinities
fn non_negative(value: f32) -> bool {
    value >= 0.0 && value.is_finite()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();

        assert_eq!(config.data.timesteps, 220);
        assert_eq!(config.data.features, 4);
        assert_eq!(config.data.classes, 3);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.epochs, 50);
        assert_eq!(config.augment.factor, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_imu_preset_validates() {
        let config = PipelineConfig {
            data: DataConfig::imu_prefixed(),
            ..PipelineConfig::default()
        };

        assert_eq!(config.data.timesteps, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feature_count_must_match_schema() {
        let mut config = PipelineConfig::default();
        config.data.features = 3;

        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_class_count_is_fixed() {
        let mut config = PipelineConfig::default();
        config.data.classes = 4;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut config = PipelineConfig::default();
        config.training.test_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.augment.gforce_scale_min = 1.2;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.data.timesteps = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nan() {
        let mut config = PipelineConfig::default();
        config.augment.gforce_scale_min = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.augment.gforce_scale_max = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.augment.sensor_noise_std = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.training.learning_rate = f32::NAN;
        assert!(config.validate().is_err());

        let config: PipelineConfig = toml::from_str(
            r#"
            [augment]
            gforce_scale_min = nan
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("trainer.toml");

        let mut config = PipelineConfig::default();
        config.training.seed = Some(99);
        config.augment.factor = 4;
        config.save_to_file(&path).unwrap();

        let loaded = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [data]
            schema = "imu_prefixed"
            timesteps = 100
            features = 3

            [training]
            epochs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.data.schema, SchemaVariant::ImuPrefixed);
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.batch_size, 32);
        assert!(config.validate().is_ok());
    }
}
