// Augmentation engine
// Expands a small labeled dataset with perturbed copies of every example

use rand::Rng;

use crate::augment::perturb::{
    add_orientation_noise, add_sensor_noise, choose_dropout_span, dropout_interpolate,
    random_shift, scale_g_force, temporal_shift,
};
use crate::config::AugmentConfig;
use crate::data::types::{Dataset, LabeledExample, Sequence};

/// What was applied to produce one variant
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerturbationLog {
    /// Gain applied to g-force, if the sequence has that column
    pub g_force_gain: Option<f32>,

    /// Rows shifted (positive = later)
    pub shift: isize,

    /// `(start, len)` of the interpolated span, if dropout fired
    pub dropout: Option<(usize, usize)>,
}

/// Counters over one augmentation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AugmentStats {
    pub originals: usize,
    pub variants: usize,
    pub shifted: usize,
    pub dropouts: usize,
}

/// Synthesizes IMU variants with a fixed perturbation order:
/// sensor noise, g-force gain, temporal shift, orientation noise, dropout.
#[derive(Debug, Clone, Default)]
pub struct Augmenter {
    config: AugmentConfig,
}

impl Augmenter {
    pub fn new(config: AugmentConfig) -> Self {
        Augmenter { config }
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    /// Produce one perturbed copy of `source`
    pub fn perturb<R>(&self, source: &Sequence, rng: &mut R) -> (Sequence, PerturbationLog)
    where
        R: Rng + ?Sized,
    {
        let config = &self.config;
        let mut sequence = source.clone();
        let mut log = PerturbationLog::default();

        add_sensor_noise(&mut sequence, config.sensor_noise_std, rng);

        log.g_force_gain = scale_g_force(
            &mut sequence,
            config.gforce_scale_min,
            config.gforce_scale_max,
            rng,
        );

        log.shift = random_shift(config.max_shift, rng);
        temporal_shift(&mut sequence, log.shift);

        add_orientation_noise(&mut sequence, config.orientation_noise_std, rng);

        if rng.random_bool(config.dropout_probability.clamp(0.0, 1.0)) {
            log.dropout =
                choose_dropout_span(sequence.timesteps(), config.max_dropout_span, rng);
            if let Some((start, len)) = log.dropout {
                dropout_interpolate(&mut sequence, start, len);
            }
        }

        (sequence, log)
    }

    /// Originals first, in order, then `factor` variants per original
    /// grouped by source example.
    pub fn augment<R>(&self, dataset: &Dataset, rng: &mut R) -> (Dataset, AugmentStats)
    where
        R: Rng + ?Sized,
    {
        let factor = self.config.factor;
        let mut examples = Vec::with_capacity(dataset.len() * (factor + 1));
        examples.extend(dataset.iter().cloned());

        let mut stats = AugmentStats {
            originals: dataset.len(),
            ..AugmentStats::default()
        };

        for example in dataset.iter() {
            for _ in 0..factor {
                let (sequence, applied) = self.perturb(&example.sequence, rng);
                if applied.shift != 0 {
                    stats.shifted += 1;
                }
                if applied.dropout.is_some() {
                    stats.dropouts += 1;
                }
                examples.push(LabeledExample::new(sequence, example.label));
                stats.variants += 1;
            }
        }

        log::info!(
            "Augmented {} originals into {} examples ({} shifted, {} with dropout)",
            stats.originals,
            examples.len(),
            stats.shifted,
            stats.dropouts
        );

        (Dataset::new(examples), stats)
    }
}
