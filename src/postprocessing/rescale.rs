// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Mapping of predictions back to their position in the original image.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, ArrayViewMut2, Axis, Ix2, Ix3, s};

use crate::context::Context;
use crate::error::{PoseError, Result};
use crate::predictions::{PoseOutputs, Predictions};

const STAGE: &str = "RescaleAndOffset";

/// How scales and offsets are applied to an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RescaleMode {
    /// `(N, 4)` boxes in `xywh`, one global scale and offset. Positions are scaled and
    /// offset, extents are only scaled.
    BboxXywh,
    /// `(N, K, >=2)` keypoints, one global scale and offset (the whole frame was resized
    /// before a bottom-up model).
    Keypoint,
    /// `(N, K, >=2)` keypoints, one scale and offset per individual (top-down crops).
    KeypointTd,
}

impl RescaleMode {
    /// Returns the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BboxXywh => "bbox_xywh",
            Self::Keypoint => "keypoint",
            Self::KeypointTd => "keypoint_td",
        }
    }
}

impl fmt::Display for RescaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RescaleMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bbox_xywh" => Ok(Self::BboxXywh),
            "keypoint" => Ok(Self::Keypoint),
            "keypoint_td" => Ok(Self::KeypointTd),
            _ => Err(format!("invalid rescale mode '{s}'")),
        }
    }
}

/// Rescales and offsets the configured outputs using the `scales` and `offsets` of the
/// context.
///
/// If the context has neither scales nor offsets the predictions are forwarded as they
/// are. Outputs that are not configured for rescaling are moved through unchanged.
#[derive(Debug, Clone)]
pub struct RescaleAndOffset {
    keys_to_rescale: Vec<String>,
    mode: RescaleMode,
}

impl RescaleAndOffset {
    /// Create a rescaling stage for `keys_to_rescale` in the given `mode`.
    pub fn new<K: Into<String>>(keys_to_rescale: impl IntoIterator<Item = K>, mode: RescaleMode) -> Self {
        Self {
            keys_to_rescale: keys_to_rescale.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    /// The geometric mode of this stage.
    #[must_use]
    pub const fn mode(&self) -> RescaleMode {
        self.mode
    }

    /// Rescale the configured outputs.
    ///
    /// # Errors
    ///
    /// - [`PoseError::ConfigError`] if the predictions are still raw candidates.
    /// - [`PoseError::MissingKey`] if only one of `scales` / `offsets` is in the context.
    /// - [`PoseError::ShapeMismatch`] if an output has the wrong rank for the mode, if a
    ///   global mode does not get exactly one scale and offset, or if in
    ///   [`RescaleMode::KeypointTd`] the number of individuals, scales and offsets differ.
    pub fn apply(&self, predictions: Predictions, context: Context) -> Result<(Predictions, Context)> {
        let outputs = predictions.into_outputs(STAGE)?;
        let (scales, offsets) = match (context.scales.as_deref(), context.offsets.as_deref()) {
            (None, None) => return Ok((Predictions::Outputs(outputs), context)),
            (Some(scales), Some(offsets)) => (scales, offsets),
            (Some(_), None) => {
                return Err(PoseError::MissingKey(
                    "context has 'scales' but no 'offsets'".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(PoseError::MissingKey(
                    "context has 'offsets' but no 'scales'".to_string(),
                ));
            }
        };

        let mut updated = PoseOutputs::new();
        for (name, array) in outputs {
            let array = if self.keys_to_rescale.contains(&name) {
                self.rescale(array, scales, offsets)
                    .map_err(|e| PoseError::ShapeMismatch(format!("cannot rescale '{name}': {e}")))?
            } else {
                array
            };
            updated.insert(name, array);
        }

        Ok((Predictions::Outputs(updated), context))
    }

    fn rescale(
        &self,
        mut array: ArrayD<f32>,
        scales: &[[f32; 2]],
        offsets: &[[f32; 2]],
    ) -> Result<ArrayD<f32>> {
        match self.mode {
            RescaleMode::BboxXywh => {
                let (scale, offset) = global_transform(scales, offsets)?;
                let boxes = array.view_mut().into_dimensionality::<Ix2>()?;
                rescale_xywh(boxes, scale, offset)?;
            }
            RescaleMode::Keypoint => {
                let (scale, offset) = global_transform(scales, offsets)?;
                let mut keypoints = array.view_mut().into_dimensionality::<Ix3>()?;
                check_xy_channels(keypoints.shape()[2])?;
                for mut individual in keypoints.outer_iter_mut() {
                    rescale_xy(individual.view_mut(), scale, offset);
                }
            }
            RescaleMode::KeypointTd => {
                let mut keypoints = array.view_mut().into_dimensionality::<Ix3>()?;
                let num_individuals = keypoints.len_of(Axis(0));
                if num_individuals != scales.len() || num_individuals != offsets.len() {
                    return Err(PoseError::ShapeMismatch(format!(
                        "there must be as many 'scales' and 'offsets' as outputs, found {}, {}, {}",
                        num_individuals,
                        scales.len(),
                        offsets.len()
                    )));
                }
                if num_individuals > 0 {
                    check_xy_channels(keypoints.shape()[2])?;
                }
                for ((mut individual, &scale), &offset) in
                    keypoints.outer_iter_mut().zip(scales).zip(offsets)
                {
                    rescale_xy(individual.view_mut(), scale, offset);
                }
            }
        }
        Ok(array)
    }
}

fn global_transform(scales: &[[f32; 2]], offsets: &[[f32; 2]]) -> Result<([f32; 2], [f32; 2])> {
    match (scales, offsets) {
        ([scale], [offset]) => Ok((*scale, *offset)),
        _ => Err(PoseError::ShapeMismatch(format!(
            "expected a single global scale and offset, found {} and {}",
            scales.len(),
            offsets.len()
        ))),
    }
}

fn check_xy_channels(channels: usize) -> Result<()> {
    if channels < 2 {
        return Err(PoseError::ShapeMismatch(format!(
            "keypoints need at least 2 channels (x, y), found {channels}"
        )));
    }
    Ok(())
}

fn rescale_xywh(mut boxes: ArrayViewMut2<'_, f32>, scale: [f32; 2], offset: [f32; 2]) -> Result<()> {
    if boxes.ncols() < 4 {
        return Err(PoseError::ShapeMismatch(format!(
            "boxes need 4 columns (x, y, w, h), found {}",
            boxes.ncols()
        )));
    }
    boxes.column_mut(0).mapv_inplace(|x| x * scale[0] + offset[0]);
    boxes.column_mut(1).mapv_inplace(|y| y * scale[1] + offset[1]);
    boxes.column_mut(2).mapv_inplace(|w| w * scale[0]);
    boxes.column_mut(3).mapv_inplace(|h| h * scale[1]);
    Ok(())
}

/// Rescale the first two channels of a `(K, C)` keypoint block; other channels are kept.
fn rescale_xy(mut keypoints: ArrayViewMut2<'_, f32>, scale: [f32; 2], offset: [f32; 2]) {
    keypoints
        .slice_mut(s![.., 0])
        .mapv_inplace(|x| x * scale[0] + offset[0]);
    keypoints
        .slice_mut(s![.., 1])
        .mapv_inplace(|y| y * scale[1] + offset[1]);
}
