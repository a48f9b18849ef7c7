// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Sequential composition of postprocessing stages.

use rayon::prelude::*;

use super::Postprocessor;
use crate::context::Context;
use crate::error::Result;
use crate::predictions::Predictions;

/// Runs a fixed, ordered list of stages, feeding each stage the output of the previous one.
///
/// An empty list is the identity transform.
#[derive(Debug, Clone, Default)]
pub struct ComposePostprocessor {
    components: Vec<Postprocessor>,
}

impl ComposePostprocessor {
    /// Create a pipeline from its stages, in execution order.
    #[must_use]
    pub fn new(components: Vec<Postprocessor>) -> Self {
        Self { components }
    }

    /// The stages, in execution order.
    #[must_use]
    pub fn components(&self) -> &[Postprocessor] {
        &self.components
    }

    /// Run every stage in order.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first stage error.
    pub fn apply(&self, predictions: Predictions, context: Context) -> Result<(Predictions, Context)> {
        self.components
            .iter()
            .try_fold((predictions, context), |(predictions, context), stage| {
                stage.apply(predictions, context)
            })
    }

    /// Run independent frames through the pipeline in parallel.
    ///
    /// The returned frames are in the same order as the input.
    ///
    /// # Errors
    ///
    /// Returns an error if any frame fails.
    pub fn apply_batch(
        &self,
        frames: Vec<(Predictions, Context)>,
    ) -> Result<Vec<(Predictions, Context)>> {
        frames
            .into_par_iter()
            .map(|(predictions, context)| self.apply(predictions, context))
            .collect()
    }
}
