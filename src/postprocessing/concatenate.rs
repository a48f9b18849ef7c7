// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Stacking of per-candidate predictions into per-key output arrays.

use std::collections::HashMap;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::context::Context;
use crate::error::{PoseError, Result};
use crate::predictions::{CandidatePrediction, PoseOutputs, Predictions};

const STAGE: &str = "ConcatenateOutputs";

/// Location of an output inside a candidate record.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OutputSource {
    key: String,
    head: String,
    value: String,
}

/// Stacks the arrays of every candidate along a new leading axis.
///
/// Row `i` of each output is taken from candidate `i`. When there are no candidates, a
/// zero-length array of shape `(0, *tail_shape)` is emitted per key, provided the stage
/// was built with [`ConcatenateOutputs::with_empty_outputs`].
#[derive(Debug, Clone)]
pub struct ConcatenateOutputs {
    sources: Vec<OutputSource>,
    empty_shapes: HashMap<String, Vec<usize>>,
    create_empty_outputs: bool,
}

impl ConcatenateOutputs {
    /// Create a stage that concatenates `(output_key, (head, value))` entries.
    ///
    /// Frames without candidates are rejected by this stage.
    pub fn new<K, H, V>(keys_to_concatenate: impl IntoIterator<Item = (K, (H, V))>) -> Self
    where
        K: Into<String>,
        H: Into<String>,
        V: Into<String>,
    {
        let sources = keys_to_concatenate
            .into_iter()
            .map(|(key, (head, value))| OutputSource {
                key: key.into(),
                head: head.into(),
                value: value.into(),
            })
            .collect();
        Self {
            sources,
            empty_shapes: HashMap::new(),
            create_empty_outputs: false,
        }
    }

    /// Create a stage that also handles frames without candidates.
    ///
    /// `empty_shapes` gives, per output key, the shape of a single candidate's array.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ConfigError`] if any key to concatenate has no empty shape.
    pub fn with_empty_outputs<K, H, V, E>(
        keys_to_concatenate: impl IntoIterator<Item = (K, (H, V))>,
        empty_shapes: impl IntoIterator<Item = (E, Vec<usize>)>,
    ) -> Result<Self>
    where
        K: Into<String>,
        H: Into<String>,
        V: Into<String>,
        E: Into<String>,
    {
        let mut stage = Self::new(keys_to_concatenate);
        stage.empty_shapes = empty_shapes
            .into_iter()
            .map(|(key, shape)| (key.into(), shape))
            .collect();
        stage.create_empty_outputs = true;

        let missing: Vec<&str> = stage
            .sources
            .iter()
            .filter(|source| !stage.empty_shapes.contains_key(&source.key))
            .map(|source| source.key.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(PoseError::ConfigError(format!(
                "an empty shape must be given for every key to concatenate when empty \
                 outputs are created, missing: {missing:?}"
            )));
        }
        Ok(stage)
    }

    /// Output keys this stage produces, in configuration order.
    pub fn output_keys(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|source| source.key.as_str())
    }

    /// Concatenate the candidates. The context is passed through untouched.
    ///
    /// # Errors
    ///
    /// - [`PoseError::ConfigError`] if the predictions are not raw candidates.
    /// - [`PoseError::MissingKey`] if a candidate lacks a configured head or value.
    /// - [`PoseError::ShapeMismatch`] if candidates disagree on an array shape, or if
    ///   there are no candidates and no empty shapes were configured.
    pub fn apply(&self, predictions: Predictions, context: Context) -> Result<(Predictions, Context)> {
        let candidates = predictions.into_candidates(STAGE)?;
        let outputs = if candidates.is_empty() {
            self.empty_outputs()?
        } else {
            self.stack(&candidates)?
        };
        Ok((Predictions::Outputs(outputs), context))
    }

    fn empty_outputs(&self) -> Result<PoseOutputs> {
        if !self.create_empty_outputs {
            return Err(PoseError::ShapeMismatch(format!(
                "{STAGE} received no candidates and was not configured to create empty outputs"
            )));
        }

        let mut outputs = PoseOutputs::new();
        for source in &self.sources {
            let tail = self.empty_shapes.get(&source.key).ok_or_else(|| {
                PoseError::MissingKey(format!("no empty shape for output '{}'", source.key))
            })?;
            let mut shape = Vec::with_capacity(tail.len() + 1);
            shape.push(0);
            shape.extend_from_slice(tail);
            outputs.insert(source.key.clone(), ArrayD::zeros(IxDyn(&shape)));
        }
        Ok(outputs)
    }

    fn stack(&self, candidates: &[CandidatePrediction]) -> Result<PoseOutputs> {
        let mut outputs = PoseOutputs::new();
        for source in &self.sources {
            let views = candidates
                .iter()
                .map(|candidate| candidate.get(&source.head, &source.value).map(|array| array.view()))
                .collect::<Result<Vec<ArrayViewD<'_, f32>>>>()?;

            let expected = views[0].shape();
            if let Some((idx, view)) = views
                .iter()
                .enumerate()
                .find(|(_, view)| view.shape() != expected)
            {
                return Err(PoseError::ShapeMismatch(format!(
                    "candidate {idx} has shape {:?} for '{}' but candidate 0 has {expected:?}",
                    view.shape(),
                    source.key
                )));
            }

            outputs.insert(source.key.clone(), ndarray::stack(Axis(0), &views)?);
        }
        Ok(outputs)
    }
}
