// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Inference runners.
//!
//! The model itself lives outside this crate and is plugged in through [`PoseModel`].
//! An [`InferenceRunner`] pairs a model with the [`Postprocessor`] for its task and turns
//! frames into final per-frame [`PoseOutputs`].

use std::time::Instant;

use ndarray::Array3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::PostprocessConfig;
use crate::context::Context;
use crate::error::{PoseError, Result};
use crate::postprocessing::{Postprocessor, build_postprocessor};
use crate::predictions::{CandidatePrediction, PoseOutputs};
use crate::task::Task;
use crate::verbose;

/// A decoded video frame in HWC layout.
pub type Frame = Array3<u8>;

/// A detector or pose model, including its preprocessing.
///
/// `predict` receives the context known before inference (for top-down models, the boxes
/// found by the detector) and returns the raw candidates together with the context the
/// preprocessor produced (scales and offsets of the resize or crops).
pub trait PoseModel {
    /// Run the model on one frame.
    ///
    /// # Errors
    ///
    /// Implementations should return [`PoseError::InferenceError`] when the model fails.
    fn predict(&mut self, frame: &Frame, context: Context) -> Result<(Vec<CandidatePrediction>, Context)>;
}

impl<F> PoseModel for F
where
    F: FnMut(&Frame, Context) -> Result<(Vec<CandidatePrediction>, Context)>,
{
    fn predict(&mut self, frame: &Frame, context: Context) -> Result<(Vec<CandidatePrediction>, Context)> {
        self(frame, context)
    }
}

/// Raw model output for one frame, before postprocessing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Candidates returned by the model.
    #[serde(default)]
    pub candidates: Vec<CandidatePrediction>,
    /// Context returned by the model's preprocessor.
    #[serde(default)]
    pub context: Context,
}

/// Accumulated timings of a runner (in milliseconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerStats {
    /// Frames processed.
    pub frames: usize,
    /// Time spent in the model.
    pub inference_ms: f64,
    /// Time spent in postprocessing.
    pub postprocess_ms: f64,
}

impl RunnerStats {
    /// Average milliseconds per frame, model and postprocessing together.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn per_frame_ms(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            (self.inference_ms + self.postprocess_ms) / self.frames as f64
        }
    }
}

/// Runs a model and postprocesses its output, frame by frame.
#[derive(Debug)]
pub struct InferenceRunner<M> {
    model: M,
    postprocessor: Postprocessor,
    stats: RunnerStats,
}

impl<M: PoseModel> InferenceRunner<M> {
    /// Create a runner from a model and its postprocessor.
    pub fn new(model: M, postprocessor: impl Into<Postprocessor>) -> Self {
        Self {
            model,
            postprocessor: postprocessor.into(),
            stats: RunnerStats::default(),
        }
    }

    /// Create a runner with the default postprocessor for `task`.
    ///
    /// # Errors
    ///
    /// Returns an error if the postprocessor cannot be built.
    pub fn for_task(model: M, task: Task, config: &PostprocessConfig) -> Result<Self> {
        Ok(Self::new(model, build_postprocessor(task, config)?))
    }

    /// The postprocessor applied to every frame.
    pub const fn postprocessor(&self) -> &Postprocessor {
        &self.postprocessor
    }

    /// Timings accumulated so far.
    pub const fn stats(&self) -> RunnerStats {
        self.stats
    }

    /// Mutable access to the wrapped model.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Run the model and the postprocessor on one frame.
    ///
    /// # Errors
    ///
    /// Returns the model's error or the postprocessor's error.
    pub fn predict(&mut self, frame: &Frame, context: Context) -> Result<PoseOutputs> {
        let start = Instant::now();
        let (candidates, context) = self.model.predict(frame, context)?;
        let inferred = Instant::now();
        let (outputs, _) = self.postprocessor.process(candidates, context)?;

        self.stats.frames += 1;
        self.stats.inference_ms += (inferred - start).as_secs_f64() * 1000.0;
        self.stats.postprocess_ms += inferred.elapsed().as_secs_f64() * 1000.0;
        Ok(outputs)
    }

    /// Run inference on a sequence of frames.
    ///
    /// When `contexts` is given it must hold exactly one context per frame; otherwise
    /// every frame starts from an empty context.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ShapeMismatch`] if the number of contexts does not match the
    /// number of frames, or the first frame error.
    pub fn inference<I>(&mut self, frames: I, contexts: Option<Vec<Context>>) -> Result<Vec<PoseOutputs>>
    where
        I: IntoIterator<Item = Frame>,
    {
        let expected = contexts.as_ref().map(Vec::len);
        let mut contexts = contexts.map(Vec::into_iter);
        let mut predictions = Vec::new();

        for (idx, frame) in frames.into_iter().enumerate() {
            let context = match contexts.as_mut() {
                Some(iter) => iter.next().ok_or_else(|| {
                    PoseError::ShapeMismatch(format!(
                        "no context for frame {idx}, only {} contexts were given",
                        expected.unwrap_or(0)
                    ))
                })?,
                None => Context::new(),
            };
            let outputs = self.predict(&frame, context)?;
            verbose!("frame {idx}: {}", describe(&outputs));
            predictions.push(outputs);
        }

        if let Some(expected) = expected {
            if expected != predictions.len() {
                return Err(PoseError::ShapeMismatch(format!(
                    "{expected} contexts were given for {} frames",
                    predictions.len()
                )));
            }
        }
        Ok(predictions)
    }
}

/// Postprocess frames that were already run through a model, in parallel.
///
/// The returned outputs are in frame order.
///
/// # Errors
///
/// Returns an error if any frame fails to postprocess.
pub fn postprocess_frames(postprocessor: &Postprocessor, frames: Vec<RawFrame>) -> Result<Vec<PoseOutputs>> {
    frames
        .into_par_iter()
        .map(|frame| {
            postprocessor
                .process(frame.candidates, frame.context)
                .map(|(outputs, _)| outputs)
        })
        .collect()
}

fn describe(outputs: &PoseOutputs) -> String {
    let mut parts: Vec<String> = outputs
        .iter()
        .map(|(key, array)| format!("{key} {:?}", array.shape()))
        .collect();
    parts.sort();
    parts.join(", ")
}
