// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Per-image geometric context.
//!
//! A [`Context`] travels next to the predictions of a single frame. It is created by the
//! model's preprocessor (which knows how the frame was resized or cropped) and read by the
//! postprocessing stages that map predictions back into original-image coordinates.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayD};
use serde::{Deserialize, Serialize};

/// Geometric metadata for one frame.
///
/// `scales` and `offsets` hold either a single global pair (the whole frame was resized)
/// or one pair per candidate (top-down crops). `bboxes` has shape `(N, 4)` and
/// `bbox_scores` has shape `(N,)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Scale factors `(x, y)` mapping model coordinates to image coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scales: Option<Vec<[f32; 2]>>,
    /// Offsets `(x, y)` added after scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offsets: Option<Vec<[f32; 2]>>,
    /// Bounding boxes the crops were taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bboxes: Option<Array2<f32>>,
    /// Detector confidence for each bounding box.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_scores: Option<Array1<f32>>,
}

impl Context {
    /// Create an empty context (no transform, no boxes).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single global scale and offset for the whole frame.
    #[must_use]
    pub fn with_scale_offset(mut self, scale: [f32; 2], offset: [f32; 2]) -> Self {
        self.scales = Some(vec![scale]);
        self.offsets = Some(vec![offset]);
        self
    }

    /// Set one scale and offset per candidate crop.
    #[must_use]
    pub fn with_crops(mut self, scales: Vec<[f32; 2]>, offsets: Vec<[f32; 2]>) -> Self {
        self.scales = Some(scales);
        self.offsets = Some(offsets);
        self
    }

    /// Set the bounding boxes and their scores.
    #[must_use]
    pub fn with_bboxes(mut self, bboxes: Array2<f32>, bbox_scores: Array1<f32>) -> Self {
        self.bboxes = Some(bboxes);
        self.bbox_scores = Some(bbox_scores);
        self
    }

    /// Returns whether the given key holds a value.
    #[must_use]
    pub const fn contains(&self, key: ContextKey) -> bool {
        match key {
            ContextKey::Scales => self.scales.is_some(),
            ContextKey::Offsets => self.offsets.is_some(),
            ContextKey::Bboxes => self.bboxes.is_some(),
            ContextKey::BboxScores => self.bbox_scores.is_some(),
        }
    }

    /// Returns an owned copy of the value stored under `key`, as a dynamic array.
    ///
    /// Scales and offsets come back with shape `(N, 2)`.
    #[must_use]
    pub fn array(&self, key: ContextKey) -> Option<ArrayD<f32>> {
        match key {
            ContextKey::Scales => self.scales.as_deref().map(pairs_to_array),
            ContextKey::Offsets => self.offsets.as_deref().map(pairs_to_array),
            ContextKey::Bboxes => self.bboxes.as_ref().map(|b| b.clone().into_dyn()),
            ContextKey::BboxScores => self.bbox_scores.as_ref().map(|s| s.clone().into_dyn()),
        }
    }
}

fn pairs_to_array(pairs: &[[f32; 2]]) -> ArrayD<f32> {
    let flat: Vec<f32> = pairs.iter().flatten().copied().collect();
    Array2::from_shape_vec((pairs.len(), 2), flat)
        .map(Array2::into_dyn)
        .unwrap_or_else(|_| Array2::<f32>::zeros((0, 2)).into_dyn())
}

/// Keys recognized in a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// `scales`
    Scales,
    /// `offsets`
    Offsets,
    /// `bboxes`
    Bboxes,
    /// `bbox_scores`
    BboxScores,
}

impl ContextKey {
    /// All recognized keys.
    pub const ALL: [Self; 4] = [Self::Scales, Self::Offsets, Self::Bboxes, Self::BboxScores];

    /// Returns the key name, which is also the output key it is copied to.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scales => "scales",
            Self::Offsets => "offsets",
            Self::Bboxes => "bboxes",
            Self::BboxScores => "bbox_scores",
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContextKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown context key '{s}'"))
    }
}
