// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Prediction containers threaded through the postprocessing pipeline.
//!
//! Raw model output arrives as a list of [`CandidatePrediction`]s (one per detected
//! individual or detection proposal). The first pipeline stage turns that list into
//! [`PoseOutputs`], a map from output key to an array whose leading axis indexes
//! candidates. [`Predictions`] is the value handed from stage to stage.

use std::collections::HashMap;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{PoseError, Result};

/// Output keys produced by the builders.
pub mod keys {
    /// Keypoints shared by every individual, shape `(N, num_bodyparts, 3)`.
    pub const BODYPARTS: &str = "bodyparts";
    /// Keypoints present at most once per frame, shape `(N, num_unique_bodyparts, 3)`.
    pub const UNIQUE_BODYPARTS: &str = "unique_bodyparts";
    /// Bounding boxes, shape `(N, 4)`.
    pub const BBOXES: &str = "bboxes";
    /// Bounding box scores, shape `(N,)`.
    pub const BBOX_SCORES: &str = "bbox_scores";
}

/// Model head names found in candidate records.
pub mod heads {
    /// Pose head for shared bodyparts.
    pub const BODYPART: &str = "bodypart";
    /// Pose head for unique bodyparts.
    pub const UNIQUE_BODYPART: &str = "unique_bodypart";
    /// Detector head.
    pub const DETECTION: &str = "detection";
}

/// Value names found under a head in candidate records.
pub mod values {
    /// Keypoint array `(K, 3)`: x, y, likelihood.
    pub const POSES: &str = "poses";
    /// Box array `(4,)`.
    pub const BBOXES: &str = "bboxes";
    /// Scalar score.
    pub const SCORES: &str = "scores";
}

/// Raw prediction for a single candidate: head name -> value name -> array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidatePrediction {
    heads: HashMap<String, HashMap<String, ArrayD<f32>>>,
}

impl CandidatePrediction {
    /// Create an empty candidate record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of `array` under `head`/`value`.
    #[must_use]
    pub fn with(mut self, head: &str, value: &str, array: ArrayD<f32>) -> Self {
        self.insert(head, value, array);
        self
    }

    /// Insert `array` under `head`/`value`, replacing any previous array.
    pub fn insert(&mut self, head: &str, value: &str, array: ArrayD<f32>) {
        self.heads
            .entry(head.to_string())
            .or_default()
            .insert(value.to_string(), array);
    }

    /// Look up the array stored under `head`/`value`.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::MissingKey`] when the head or the value is absent, which
    /// means the model and the pipeline disagree on the output layout.
    pub fn get(&self, head: &str, value: &str) -> Result<&ArrayD<f32>> {
        let values = self
            .heads
            .get(head)
            .ok_or_else(|| PoseError::MissingKey(format!("head '{head}' not in prediction")))?;
        values.get(value).ok_or_else(|| {
            PoseError::MissingKey(format!("value '{value}' not in head '{head}'"))
        })
    }

    /// Names of the heads present in this record.
    pub fn heads(&self) -> impl Iterator<Item = &str> {
        self.heads.keys().map(String::as_str)
    }
}

/// Final per-frame outputs: output key -> array with candidates on the leading axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseOutputs {
    arrays: HashMap<String, ArrayD<f32>>,
}

impl PoseOutputs {
    /// Create an empty output map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an array, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, array: ArrayD<f32>) -> Option<ArrayD<f32>> {
        self.arrays.insert(key.into(), array)
    }

    /// Get the array stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ArrayD<f32>> {
        self.arrays.get(key)
    }

    /// Get a mutable reference to the array stored under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut ArrayD<f32>> {
        self.arrays.get_mut(key)
    }

    /// Get the array stored under `key`, failing if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::MissingKey`] if there is no such output.
    pub fn require(&self, key: &str) -> Result<&ArrayD<f32>> {
        self.arrays
            .get(key)
            .ok_or_else(|| PoseError::MissingKey(format!("output '{key}' not found")))
    }

    /// Remove and return the array stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<ArrayD<f32>> {
        self.arrays.remove(key)
    }

    /// Returns whether an array is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.arrays.contains_key(key)
    }

    /// Number of output keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// Returns whether there are no outputs at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Output keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    /// Iterate over `(key, array)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.arrays.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of candidates (leading dimension) of the array under `key`.
    #[must_use]
    pub fn num_candidates(&self, key: &str) -> Option<usize> {
        self.arrays.get(key).map(|a| a.shape().first().copied().unwrap_or(0))
    }
}

impl IntoIterator for PoseOutputs {
    type Item = (String, ArrayD<f32>);
    type IntoIter = std::collections::hash_map::IntoIter<String, ArrayD<f32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.arrays.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, ArrayD<f32>)> for PoseOutputs {
    fn from_iter<I: IntoIterator<Item = (K, ArrayD<f32>)>>(iter: I) -> Self {
        Self {
            arrays: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Value passed between postprocessing stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predictions {
    /// Raw per-candidate records straight from the model.
    Candidates(Vec<CandidatePrediction>),
    /// Stacked per-key outputs.
    Outputs(PoseOutputs),
}

impl Predictions {
    /// Unwrap stacked outputs.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ConfigError`] if the predictions are still raw candidates,
    /// meaning `stage` was placed before the concatenation stage.
    pub fn into_outputs(self, stage: &str) -> Result<PoseOutputs> {
        match self {
            Self::Outputs(outputs) => Ok(outputs),
            Self::Candidates(_) => Err(PoseError::ConfigError(format!(
                "{stage} expects concatenated outputs but received raw candidates"
            ))),
        }
    }

    /// Unwrap raw candidates.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ConfigError`] if the predictions were already concatenated.
    pub fn into_candidates(self, stage: &str) -> Result<Vec<CandidatePrediction>> {
        match self {
            Self::Candidates(candidates) => Ok(candidates),
            Self::Outputs(_) => Err(PoseError::ConfigError(format!(
                "{stage} expects raw candidates but received concatenated outputs"
            ))),
        }
    }
}

impl From<Vec<CandidatePrediction>> for Predictions {
    fn from(candidates: Vec<CandidatePrediction>) -> Self {
        Self::Candidates(candidates)
    }
}

impl From<PoseOutputs> for Predictions {
    fn from(outputs: PoseOutputs) -> Self {
        Self::Outputs(outputs)
    }
}
