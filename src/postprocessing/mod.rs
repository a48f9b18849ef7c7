// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing for pose and detector model outputs.
//!
//! A postprocessing pipeline is a fixed chain of [`Postprocessor`] stages. Each stage takes
//! the predictions for one frame together with its [`Context`] and returns new, owned
//! predictions and context:
//!
//! - [`ConcatenateOutputs`] stacks per-candidate arrays into per-key outputs.
//! - [`RescaleAndOffset`] maps coordinates back into original-image space.
//! - [`BboxToCoco`] converts boxes from `xyxy` to `xywh`.
//! - [`AddContextToOutput`] copies context fields (e.g. crop boxes) into the outputs.
//! - [`PadOutputs`] pads the candidate axis to a fixed size with a sentinel.
//! - [`ComposePostprocessor`] runs stages in order.
//!
//! The [`builders`] module wires these into the pipelines used for bottom-up, top-down and
//! detector-only inference.

pub mod bbox;
pub mod builders;
pub mod compose;
pub mod concatenate;
pub mod context_output;
pub mod pad;
pub mod rescale;

pub use bbox::BboxToCoco;
pub use builders::{
    build_bottom_up_postprocessor, build_detector_postprocessor, build_postprocessor,
    build_top_down_postprocessor,
};
pub use compose::ComposePostprocessor;
pub use concatenate::ConcatenateOutputs;
pub use context_output::AddContextToOutput;
pub use pad::PadOutputs;
pub use rescale::{RescaleAndOffset, RescaleMode};

use crate::context::Context;
use crate::error::Result;
use crate::predictions::{CandidatePrediction, PoseOutputs, Predictions};

/// A single postprocessing stage.
///
/// The set of stages is closed; every variant holds only immutable configuration, so a
/// postprocessor can be shared between threads and applied to independent frames
/// concurrently.
#[derive(Debug, Clone)]
pub enum Postprocessor {
    /// Ordered chain of stages.
    Compose(ComposePostprocessor),
    /// Candidate list -> stacked outputs.
    Concatenate(ConcatenateOutputs),
    /// Affine mapping back to image coordinates.
    Rescale(RescaleAndOffset),
    /// `xyxy` -> `xywh` boxes.
    BboxToCoco(BboxToCoco),
    /// Context fields copied into outputs.
    AddContext(AddContextToOutput),
    /// Candidate axis padded to a fixed size.
    Pad(PadOutputs),
}

impl Postprocessor {
    /// Apply this stage to the predictions of one frame.
    ///
    /// # Errors
    ///
    /// Propagates the stage's error: a missing key, a shape mismatch, or a configuration
    /// error when the stage receives the wrong kind of predictions.
    pub fn apply(&self, predictions: Predictions, context: Context) -> Result<(Predictions, Context)> {
        match self {
            Self::Compose(stage) => stage.apply(predictions, context),
            Self::Concatenate(stage) => stage.apply(predictions, context),
            Self::Rescale(stage) => stage.apply(predictions, context),
            Self::BboxToCoco(stage) => stage.apply(predictions, context),
            Self::AddContext(stage) => stage.apply(predictions, context),
            Self::Pad(stage) => stage.apply(predictions, context),
        }
    }

    /// Run raw candidates through this stage and return the final outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage fails or if the stage does not end with stacked
    /// outputs.
    pub fn process(
        &self,
        candidates: Vec<CandidatePrediction>,
        context: Context,
    ) -> Result<(PoseOutputs, Context)> {
        let (predictions, context) = self.apply(Predictions::Candidates(candidates), context)?;
        Ok((predictions.into_outputs(self.name())?, context))
    }

    /// Name of the stage, used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Compose(_) => "ComposePostprocessor",
            Self::Concatenate(_) => "ConcatenateOutputs",
            Self::Rescale(_) => "RescaleAndOffset",
            Self::BboxToCoco(_) => "BboxToCoco",
            Self::AddContext(_) => "AddContextToOutput",
            Self::Pad(_) => "PadOutputs",
        }
    }
}

impl From<ComposePostprocessor> for Postprocessor {
    fn from(stage: ComposePostprocessor) -> Self {
        Self::Compose(stage)
    }
}

impl From<ConcatenateOutputs> for Postprocessor {
    fn from(stage: ConcatenateOutputs) -> Self {
        Self::Concatenate(stage)
    }
}

impl From<RescaleAndOffset> for Postprocessor {
    fn from(stage: RescaleAndOffset) -> Self {
        Self::Rescale(stage)
    }
}

impl From<BboxToCoco> for Postprocessor {
    fn from(stage: BboxToCoco) -> Self {
        Self::BboxToCoco(stage)
    }
}

impl From<AddContextToOutput> for Postprocessor {
    fn from(stage: AddContextToOutput) -> Self {
        Self::AddContext(stage)
    }
}

impl From<PadOutputs> for Postprocessor {
    fn from(stage: PadOutputs) -> Self {
        Self::Pad(stage)
    }
}
