// Augmentation module
// Synthetic IMU variants for small labeled trick datasets

pub mod engine;
pub mod perturb;

pub use engine::{AugmentStats, Augmenter, PerturbationLog};
