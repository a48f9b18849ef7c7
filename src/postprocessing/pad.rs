// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Padding of the candidate axis to a fixed size.

use std::collections::HashMap;

use ndarray::{ArrayD, Axis, IxDyn};

use crate::context::Context;
use crate::error::{PoseError, Result};
use crate::predictions::Predictions;

const STAGE: &str = "PadOutputs";

/// Pads outputs so that each configured key has exactly `max_individuals[key]` rows.
///
/// Missing rows are filled with `pad_value`, which downstream consumers read as "absent
/// individual". A target of `0` disables padding for that key. Keys without a target and
/// configured keys absent from the outputs are left as they are.
#[derive(Debug, Clone)]
pub struct PadOutputs {
    max_individuals: HashMap<String, usize>,
    pad_value: f32,
}

impl PadOutputs {
    /// Create a padding stage from `(output_key, target_rows)` entries.
    pub fn new<K: Into<String>>(
        max_individuals: impl IntoIterator<Item = (K, usize)>,
        pad_value: f32,
    ) -> Self {
        Self {
            max_individuals: max_individuals
                .into_iter()
                .map(|(key, max)| (key.into(), max))
                .collect(),
            pad_value,
        }
    }

    /// Replace the padding sentinel.
    #[must_use]
    pub const fn with_pad_value(mut self, pad_value: f32) -> Self {
        self.pad_value = pad_value;
        self
    }

    /// The sentinel written into padding rows.
    #[must_use]
    pub const fn pad_value(&self) -> f32 {
        self.pad_value
    }

    /// Target number of rows for `key`, if configured.
    #[must_use]
    pub fn target(&self, key: &str) -> Option<usize> {
        self.max_individuals.get(key).copied()
    }

    /// Pad the outputs. The context is passed through untouched.
    ///
    /// # Errors
    ///
    /// - [`PoseError::ConfigError`] if the predictions are still raw candidates.
    /// - [`PoseError::ShapeMismatch`] if a padded output is a scalar, or already holds more
    ///   rows than its target.
    pub fn apply(&self, predictions: Predictions, context: Context) -> Result<(Predictions, Context)> {
        let mut outputs = predictions.into_outputs(STAGE)?;
        for (key, &target) in &self.max_individuals {
            if target == 0 {
                continue;
            }
            if let Some(array) = outputs.remove(key) {
                let padded = pad_rows(array, target, self.pad_value)
                    .map_err(|e| PoseError::ShapeMismatch(format!("cannot pad '{key}': {e}")))?;
                outputs.insert(key.clone(), padded);
            }
        }
        Ok((Predictions::Outputs(outputs), context))
    }
}

fn pad_rows(array: ArrayD<f32>, target: usize, pad_value: f32) -> Result<ArrayD<f32>> {
    let Some(&current) = array.shape().first() else {
        return Err(PoseError::ShapeMismatch("output is a scalar".to_string()));
    };
    if current > target {
        return Err(PoseError::ShapeMismatch(format!(
            "{current} rows exceed the maximum of {target}"
        )));
    }
    if current == target {
        return Ok(array);
    }

    let mut pad_shape = array.shape().to_vec();
    pad_shape[0] = target - current;
    let padding = ArrayD::from_elem(IxDyn(&pad_shape), pad_value);
    Ok(ndarray::concatenate(Axis(0), &[array.view(), padding.view()])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictions::{PoseOutputs, keys};
    use ndarray::{Array1, Array3};

    fn run(stage: &PadOutputs, outputs: PoseOutputs) -> Result<PoseOutputs> {
        let (predictions, _) = stage.apply(Predictions::Outputs(outputs), Context::new())?;
        predictions.into_outputs("test")
    }

    fn bodyparts(rows: usize) -> PoseOutputs {
        [(keys::BODYPARTS, Array3::from_elem((rows, 5, 3), 7.0_f32).into_dyn())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_pad_below_target() {
        let stage = PadOutputs::new([(keys::BODYPARTS, 4)], -1.0);
        let outputs = run(&stage, bodyparts(2)).unwrap();
        let padded = outputs.get(keys::BODYPARTS).unwrap();

        assert_eq!(padded.shape(), &[4, 5, 3]);
        assert!(padded.index_axis(Axis(0), 1).iter().all(|&v| (v - 7.0).abs() < f32::EPSILON));
        assert!(padded.index_axis(Axis(0), 2).iter().all(|&v| (v + 1.0).abs() < f32::EPSILON));
        assert!(padded.index_axis(Axis(0), 3).iter().all(|&v| (v + 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_pad_at_target_is_noop() {
        let stage = PadOutputs::new([(keys::BODYPARTS, 3)], -1.0);
        let input = bodyparts(3);
        let outputs = run(&stage, input.clone()).unwrap();
        assert_eq!(outputs, input);

        let again = run(&stage, outputs.clone()).unwrap();
        assert_eq!(again, outputs);
    }

    #[test]
    fn test_zero_target_and_unconfigured_keys_untouched() {
        let stage = PadOutputs::new([(keys::BODYPARTS, 0), (keys::BBOXES, 3)], -1.0);
        let mut input = bodyparts(1);
        input.insert(keys::BBOX_SCORES, Array1::from_elem(1, 0.5_f32).into_dyn());
        let outputs = run(&stage, input.clone()).unwrap();
        assert_eq!(outputs, input);
    }

    #[test]
    fn test_pad_empty_output() {
        let stage = PadOutputs::new([(keys::BBOX_SCORES, 2)], -1.0);
        let input: PoseOutputs = [(keys::BBOX_SCORES, Array1::<f32>::zeros(0).into_dyn())]
            .into_iter()
            .collect();
        let outputs = run(&stage, input).unwrap();
        let scores = outputs.get(keys::BBOX_SCORES).unwrap();
        assert_eq!(scores.shape(), &[2]);
        assert!(scores.iter().all(|&v| (v + 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_over_capacity_is_rejected() {
        let stage = PadOutputs::new([(keys::BODYPARTS, 2)], -1.0);
        assert!(matches!(run(&stage, bodyparts(3)), Err(PoseError::ShapeMismatch(_))));
    }
}
