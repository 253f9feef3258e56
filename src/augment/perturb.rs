// Sequence perturbations
// Individual randomized transforms used to synthesize IMU variants

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::data::types::{Sequence, G_FORCE, ORIENTATION_FEATURES};

/// Add zero-mean Gaussian noise to every value of every row
pub fn add_sensor_noise<R>(sequence: &mut Sequence, std_dev: f32, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let Some(normal) = gaussian(std_dev) else {
        return;
    };
    for value in sequence.values_mut() {
        *value += normal.sample(rng);
    }
}

/// Add Gaussian noise to pitch, roll and yaw only
pub fn add_orientation_noise<R>(sequence: &mut Sequence, std_dev: f32, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let Some(normal) = gaussian(std_dev) else {
        return;
    };
    for row in sequence.rows_mut() {
        for value in row.iter_mut().take(ORIENTATION_FEATURES) {
            *value += normal.sample(rng);
        }
    }
}

/// Multiply the g-force column by one gain drawn from `[min, max]`.
/// Returns the gain, or None when the sequence has no g-force column.
pub fn scale_g_force<R>(sequence: &mut Sequence, min: f32, max: f32, rng: &mut R) -> Option<f32>
where
    R: Rng + ?Sized,
{
    if !sequence.has_g_force() {
        return None;
    }

    let gain = if max > min {
        rng.random_range(min..=max)
    } else {
        min
    };
    for row in sequence.rows_mut() {
        row[G_FORCE] *= gain;
    }
    Some(gain)
}

/// Draw a shift in `[-max_shift, max_shift]`.
/// Bounds beyond `i32::MAX` rows saturate.
pub fn random_shift<R>(max_shift: usize, rng: &mut R) -> isize
where
    R: Rng + ?Sized,
{
    let bound = i32::try_from(max_shift).unwrap_or(i32::MAX);
    rng.random_range(-bound..=bound) as isize
}

/// Shift the rows in time, keeping the length.
///
/// A positive `shift` moves rows later and fills the front with copies of
/// the first row; a negative `shift` moves rows earlier and fills the back
/// with copies of the last row.
pub fn temporal_shift(sequence: &mut Sequence, shift: isize) {
    let n = sequence.timesteps();
    if shift == 0 || n == 0 {
        return;
    }

    let k = shift.unsigned_abs().min(n);
    let features = sequence.features();
    let values = sequence.values_mut();

    if shift > 0 {
        let first = values[..features].to_vec();
        values.copy_within(..(n - k) * features, k * features);
        for row in values[..k * features].chunks_exact_mut(features) {
            row.copy_from_slice(&first);
        }
    } else {
        let last = values[(n - 1) * features..].to_vec();
        values.copy_within(k * features.., 0);
        for row in values[(n - k) * features..].chunks_exact_mut(features) {
            row.copy_from_slice(&last);
        }
    }
}

/// Pick a dropout span strictly inside the sequence.
///
/// Returns `(start, len)` with `start >= 1` and `start + len <= n - 1`, so
/// neither the first nor the last row is covered. None when the sequence is
/// too short to have an interior.
pub fn choose_dropout_span<R>(
    timesteps: usize,
    max_span: usize,
    rng: &mut R,
) -> Option<(usize, usize)>
where
    R: Rng + ?Sized,
{
    let max_len = max_span.min(timesteps.saturating_sub(2));
    if max_len == 0 {
        return None;
    }

    let len = rng.random_range(1..=max_len);
    let start = rng.random_range(1..=timesteps - 1 - len);
    Some((start, len))
}

/// Replace rows `start..start + len` with a straight line between the row
/// before the span and the row after it, column by column.
///
/// Spans touching the first or last row are ignored.
pub fn dropout_interpolate(sequence: &mut Sequence, start: usize, len: usize) {
    let n = sequence.timesteps();
    if len == 0 || start == 0 || start + len >= n {
        return;
    }

    let before = sequence.row(start - 1).to_vec();
    let after = sequence.row(start + len).to_vec();
    let steps = (len + 1) as f32;

    for i in 0..len {
        let frac = (i + 1) as f32 / steps;
        let row = sequence.row_mut(start + i);
        for (c, value) in row.iter_mut().enumerate() {
            *value = before[c] + (after[c] - before[c]) * frac;
        }
    }
}

fn gaussian(std_dev: f32) -> Option<Normal<f32>> {
    if std_dev <= 0.0 {
        return None;
    }
    Normal::new(0.0, std_dev).ok()
}
