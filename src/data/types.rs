// Dataset types
// Raw IMU readings, fixed-length sequences, labels and labeled collections

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::data::DataError;

/// Column index of pitch within a feature row
pub const PITCH: usize = 0;
/// Column index of roll within a feature row
pub const ROLL: usize = 1;
/// Column index of yaw within a feature row
pub const YAW: usize = 2;
/// Column index of g-force within a feature row (only present in 4-wide schemas)
pub const G_FORCE: usize = 3;

/// Number of orientation columns (pitch, roll, yaw) at the front of every row
pub const ORIENTATION_FEATURES: usize = 3;

/// Number of trick categories the classifier distinguishes
pub const CLASS_COUNT: usize = 3;

/// A single IMU reading parsed from one log line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,

    /// Not reported by the older firmware log format
    pub g_force: Option<f32>,
}

impl RawSample {
    pub fn orientation(pitch: f32, roll: f32, yaw: f32) -> Self {
        RawSample {
            pitch,
            roll,
            yaw,
            g_force: None,
        }
    }

    pub fn with_g_force(pitch: f32, roll: f32, yaw: f32, g_force: f32) -> Self {
        RawSample {
            pitch,
            roll,
            yaw,
            g_force: Some(g_force),
        }
    }

    /// Write this reading into a feature row of the given width.
    /// Columns the reading does not carry are zero.
    pub fn write_row(&self, row: &mut [f32]) {
        let values = [
            self.pitch,
            self.roll,
            self.yaw,
            self.g_force.unwrap_or(0.0),
        ];
        for (dst, src) in row.iter_mut().zip(values.iter()) {
            *dst = *src;
        }
    }
}

/// Fixed-length, row-major sequence of feature rows
///
/// Every row has exactly `features` values and there are exactly
/// `timesteps` rows. Construction through [`Sequence::from_samples`]
/// pads or truncates to the requested length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    timesteps: usize,
    features: usize,
    values: Vec<f32>,
}

impl Sequence {
    /// All-zero sequence
    pub fn zeros(timesteps: usize, features: usize) -> Self {
        Sequence {
            timesteps,
            features,
            values: vec![0.0; timesteps * features],
        }
    }

    /// Build a sequence from flat row-major values.
    /// Returns None if the value count does not match the shape.
    pub fn from_values(timesteps: usize, features: usize, values: Vec<f32>) -> Option<Self> {
        if values.len() != timesteps * features {
            return None;
        }
        Some(Sequence {
            timesteps,
            features,
            values,
        })
    }

    /// Normalize a variable-length recording to `timesteps` rows.
    ///
    /// Short recordings are padded by repeating the last reading (zero rows
    /// when the recording is empty). Long recordings keep their first
    /// `timesteps` readings.
    pub fn from_samples(samples: &[RawSample], timesteps: usize, features: usize) -> Self {
        let mut sequence = Sequence::zeros(timesteps, features);
        let kept = samples.len().min(timesteps);

        for (t, sample) in samples.iter().take(kept).enumerate() {
            sample.write_row(sequence.row_mut(t));
        }

        if kept > 0 && kept < timesteps {
            let last = sequence.row(kept - 1).to_vec();
            for t in kept..timesteps {
                sequence.row_mut(t).copy_from_slice(&last);
            }
        }

        sequence
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn row(&self, t: usize) -> &[f32] {
        let start = t * self.features;
        &self.values[start..start + self.features]
    }

    pub fn row_mut(&mut self, t: usize) -> &mut [f32] {
        let start = t * self.features;
        &mut self.values[start..start + self.features]
    }

    pub fn rows(&self) -> std::slice::ChunksExact<'_, f32> {
        self.values.chunks_exact(self.features.max(1))
    }

    pub fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        self.values.chunks_exact_mut(self.features.max(1))
    }

    /// True when the sequence carries a g-force column
    pub fn has_g_force(&self) -> bool {
        self.features > G_FORCE
    }
}

/// A sequence together with its class index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub sequence: Sequence,
    pub label: usize,
}

impl LabeledExample {
    pub fn new(sequence: Sequence, label: usize) -> Self {
        LabeledExample { sequence, label }
    }
}

/// Bijection between trick names and contiguous class indices
///
/// Indices are assigned in sorted name order, so `bunnyhop < manual < ollie`
/// maps to `0, 1, 2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    names: Vec<String>,
}

impl LabelMap {
    /// Build the map from every observed trick name (duplicates allowed).
    /// Fails unless exactly `expected` distinct names are present.
    pub fn from_names<'a, I>(names: I, expected: usize) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unique: BTreeSet<&str> = names.into_iter().collect();
        let names: Vec<String> = unique.into_iter().map(str::to_string).collect();

        if names.len() != expected {
            return Err(DataError::LabelCardinality {
                expected,
                found: names,
            });
        }

        Ok(LabelMap { names })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok()
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Ordered collection of labeled examples sharing one shape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    examples: Vec<LabeledExample>,
}

impl Dataset {
    pub fn new(examples: Vec<LabeledExample>) -> Self {
        Dataset { examples }
    }

    pub fn push(&mut self, example: LabeledExample) {
        self.examples.push(example);
    }

    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabeledExample> {
        self.examples.iter()
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// (timesteps, features) of the first example, if any
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.examples
            .first()
            .map(|e| (e.sequence.timesteps(), e.sequence.features()))
    }

    /// Number of examples per class index, indexed by label
    pub fn class_counts(&self, classes: usize) -> Vec<usize> {
        let mut counts = vec![0; classes];
        for example in &self.examples {
            if let Some(count) = counts.get_mut(example.label) {
                *count += 1;
            }
        }
        counts
    }
}

impl FromIterator<LabeledExample> for Dataset {
    fn from_iter<I: IntoIterator<Item = LabeledExample>>(iter: I) -> Self {
        Dataset::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<RawSample> {
        (0..n)
            .map(|i| RawSample::with_g_force(i as f32, 0.0, 0.0, 1.0))
            .collect()
    }

    #[test]
    fn test_from_samples_pads_with_last_row() {
        let seq = Sequence::from_samples(&ramp(3), 6, 4);

        assert_eq!(seq.timesteps(), 6);
        assert_eq!(seq.values().len(), 24);
        assert_eq!(seq.row(2), &[2.0, 0.0, 0.0, 1.0]);
        for t in 3..6 {
            assert_eq!(seq.row(t), seq.row(2));
        }
    }

    #[test]
    fn test_from_samples_truncates_tail() {
        let seq = Sequence::from_samples(&ramp(10), 4, 4);

        assert_eq!(seq.timesteps(), 4);
        assert_eq!(seq.row(3)[PITCH], 3.0);
    }

    #[test]
    fn test_from_samples_empty_is_zero() {
        let seq = Sequence::from_samples(&[], 5, 3);

        assert_eq!(seq.values().len(), 15);
        assert!(seq.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_orientation_only_sample_in_three_wide_row() {
        let samples = vec![RawSample::orientation(1.0, 2.0, 3.0)];
        let seq = Sequence::from_samples(&samples, 2, 3);

        assert_eq!(seq.row(0), &[1.0, 2.0, 3.0]);
        assert!(!seq.has_g_force());
    }

    #[test]
    fn test_label_map_sorted_bijection() {
        let names = ["ollie", "manual", "bunnyhop", "ollie"];
        let map = LabelMap::from_names(names.iter().copied(), 3).unwrap();

        assert_eq!(map.index_of("bunnyhop"), Some(0));
        assert_eq!(map.index_of("manual"), Some(1));
        assert_eq!(map.index_of("ollie"), Some(2));
        assert_eq!(map.name_of(2), Some("ollie"));
        assert_eq!(map.index_of("wheelie"), None);
    }

    #[test]
    fn test_label_map_rejects_wrong_cardinality() {
        let two = LabelMap::from_names(["a", "b"].iter().copied(), 3);
        assert!(matches!(two, Err(DataError::LabelCardinality { .. })));

        let four = LabelMap::from_names(["a", "b", "c", "d"].iter().copied(), 3);
        assert!(matches!(four, Err(DataError::LabelCardinality { .. })));
    }

    #[test]
    fn test_class_counts() {
        let seq = Sequence::zeros(2, 3);
        let dataset: Dataset = [0, 1, 1, 2, 2, 2]
            .iter()
            .map(|l| LabeledExample::new(seq.clone(), *l))
            .collect();

        assert_eq!(dataset.class_counts(3), vec![1, 2, 3]);
        assert_eq!(dataset.shape(), Some((2, 3)));
    }
}
