// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Copying of context fields into the outputs.

use crate::context::{Context, ContextKey};
use crate::error::Result;
use crate::predictions::Predictions;

const STAGE: &str = "AddContextToOutput";

/// Adds context items to the outputs, such as the boxes the top-down crops came from.
///
/// Each present key is copied under its own name; absent keys are skipped.
#[derive(Debug, Clone)]
pub struct AddContextToOutput {
    keys: Vec<ContextKey>,
}

impl AddContextToOutput {
    /// Create a stage copying the given context keys.
    pub fn new(keys: impl IntoIterator<Item = ContextKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Copy the configured context fields.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PoseError::ConfigError`] if the predictions are still raw candidates.
    pub fn apply(&self, predictions: Predictions, context: Context) -> Result<(Predictions, Context)> {
        let mut outputs = predictions.into_outputs(STAGE)?;
        for &key in &self.keys {
            if let Some(array) = context.array(key) {
                outputs.insert(key.as_str(), array);
            }
        }
        Ok((Predictions::Outputs(outputs), context))
    }
}
