// Trick Trainer - IMU trick classifier training pipeline
// Module declarations

pub mod augment;
pub mod config;
pub mod data;
pub mod logger;
pub mod model;
pub mod pipeline;

pub use config::{
    AugmentConfig, ConfigError, DataConfig, ExportConfig, PipelineConfig, TrainingConfig,
};
pub use pipeline::{run_pipeline, PipelineError, RunSummary};
