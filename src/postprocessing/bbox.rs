// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Bounding box format conversion.

use ndarray::Ix2;

use crate::context::Context;
use crate::error::{PoseError, Result};
use crate::predictions::Predictions;

const STAGE: &str = "BboxToCoco";

/// Converts boxes from corner pairs `(x1, y1, x2, y2)` to COCO `(x, y, w, h)`.
#[derive(Debug, Clone)]
pub struct BboxToCoco {
    bounding_box_keys: Vec<String>,
}

impl BboxToCoco {
    /// Create a conversion stage for the given output keys.
    pub fn new<K: Into<String>>(bounding_box_keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            bounding_box_keys: bounding_box_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Convert every configured box array.
    ///
    /// # Errors
    ///
    /// - [`PoseError::MissingKey`] if a configured key is absent.
    /// - [`PoseError::ShapeMismatch`] if a box array is not `(N, >=4)`.
    pub fn apply(&self, predictions: Predictions, context: Context) -> Result<(Predictions, Context)> {
        let mut outputs = predictions.into_outputs(STAGE)?;
        for key in &self.bounding_box_keys {
            let array = outputs
                .get_mut(key)
                .ok_or_else(|| PoseError::MissingKey(format!("{STAGE} output '{key}' not found")))?;
            let mut boxes = array.view_mut().into_dimensionality::<Ix2>()?;
            if boxes.ncols() < 4 {
                return Err(PoseError::ShapeMismatch(format!(
                    "'{key}' boxes need 4 columns, found {}",
                    boxes.ncols()
                )));
            }
            for mut row in boxes.rows_mut() {
                row[2] -= row[0];
                row[3] -= row[1];
            }
        }
        Ok((Predictions::Outputs(outputs), context))
    }
}
