// Stratified dataset splitting
// Partitions a dataset so every class keeps its proportion on both sides

use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::types::Dataset;

/// Result of a stratified split
#[derive(Debug, Clone, Default)]
pub struct Split {
    /// Examples kept for the larger side (training)
    pub kept: Dataset,

    /// Examples held out (test or validation)
    pub held_out: Dataset,
}

/// Split `dataset` so that roughly `fraction` of every class is held out.
///
/// Per class, `round(n * fraction)` examples are held out, but a class with
/// at least two examples always keeps one on each side when `fraction > 0`.
/// Both sides preserve the original example order.
pub fn stratified_split<R>(dataset: &Dataset, fraction: f64, classes: usize, rng: &mut R) -> Split
where
    R: Rng + ?Sized,
{
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); classes];
    for (index, example) in dataset.iter().enumerate() {
        if let Some(bucket) = by_class.get_mut(example.label) {
            bucket.push(index);
        }
    }

    let mut held = vec![false; dataset.len()];
    for bucket in by_class.iter_mut() {
        let n = bucket.len();
        let mut take = (n as f64 * fraction).round() as usize;
        if fraction > 0.0 && n >= 2 {
            take = take.clamp(1, n - 1);
        } else {
            take = take.min(n.saturating_sub(1));
        }

        bucket.shuffle(rng);
        for &index in bucket.iter().take(take) {
            held[index] = true;
        }
    }

    let mut split = Split::default();
    for (example, is_held) in dataset.iter().zip(held) {
        if is_held {
            split.held_out.push(example.clone());
        } else {
            split.kept.push(example.clone());
        }
    }

    split
}
