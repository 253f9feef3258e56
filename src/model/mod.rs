// Model module
// Training backend interface, the burn network, its training loop and export

pub mod backend;
pub mod callbacks;
pub mod export;
pub mod network;
pub mod trainer;

pub use backend::{
    evaluate, EpochMetrics, ExportError, ExportVariant, Metrics, Prediction, TrainedModel,
    TrainingBackend, TrainingError, TrainingOutcome,
};
pub use export::{decode_network, encode_network};
pub use network::{TrickNet, TrickNetConfig};
pub use trainer::{BurnBackend, CpuBackend, CpuTrainBackend, TrickClassifier};
