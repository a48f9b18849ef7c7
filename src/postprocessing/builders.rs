// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Default pipelines for each task.

use super::{
    AddContextToOutput, BboxToCoco, ComposePostprocessor, ConcatenateOutputs, PadOutputs,
    Postprocessor, RescaleAndOffset, RescaleMode,
};
use crate::config::{DEFAULT_PAD_VALUE, PostprocessConfig};
use crate::context::ContextKey;
use crate::error::Result;
use crate::predictions::{heads, keys, values};
use crate::task::Task;

/// Number of values stored per keypoint: x, y, likelihood.
const KEYPOINT_DIM: usize = 3;

type KeySources = Vec<(&'static str, (&'static str, &'static str))>;

/// Keys to concatenate, their empty shapes and keys to rescale, shared by the pose builders.
fn pose_keys(
    num_bodyparts: usize,
    num_unique_bodyparts: usize,
) -> (KeySources, Vec<(&'static str, Vec<usize>)>, Vec<&'static str>) {
    let mut keys_to_concatenate = vec![(keys::BODYPARTS, (heads::BODYPART, values::POSES))];
    let mut empty_shapes = vec![(keys::BODYPARTS, vec![num_bodyparts, KEYPOINT_DIM])];
    let mut keys_to_rescale = vec![keys::BODYPARTS];
    if num_unique_bodyparts > 0 {
        keys_to_concatenate.push((keys::UNIQUE_BODYPARTS, (heads::UNIQUE_BODYPART, values::POSES)));
        empty_shapes.push((keys::UNIQUE_BODYPARTS, vec![num_unique_bodyparts, KEYPOINT_DIM]));
        keys_to_rescale.push(keys::UNIQUE_BODYPARTS);
    }
    (keys_to_concatenate, empty_shapes, keys_to_rescale)
}

/// Create the postprocessor for bottom-up pose estimation.
///
/// Concatenate -> rescale ([`RescaleMode::Keypoint`]) -> pad `bodyparts` to
/// `max_individuals`. Unique bodyparts are never padded.
///
/// # Errors
///
/// Returns an error if a stage cannot be built.
pub fn build_bottom_up_postprocessor(
    max_individuals: usize,
    num_bodyparts: usize,
    num_unique_bodyparts: usize,
) -> Result<ComposePostprocessor> {
    let (keys_to_concatenate, empty_shapes, keys_to_rescale) =
        pose_keys(num_bodyparts, num_unique_bodyparts);

    Ok(ComposePostprocessor::new(vec![
        ConcatenateOutputs::with_empty_outputs(keys_to_concatenate, empty_shapes)?.into(),
        RescaleAndOffset::new(keys_to_rescale, RescaleMode::Keypoint).into(),
        PadOutputs::new(
            [(keys::BODYPARTS, max_individuals), (keys::UNIQUE_BODYPARTS, 0)],
            DEFAULT_PAD_VALUE,
        )
        .into(),
    ]))
}

/// Create the postprocessor for top-down pose estimation.
///
/// Concatenate -> rescale ([`RescaleMode::KeypointTd`], one crop per individual) -> copy
/// `bboxes` and `bbox_scores` from the context -> pad `bodyparts`, `bboxes` and
/// `bbox_scores` to `max_individuals`.
///
/// # Errors
///
/// Returns an error if a stage cannot be built.
pub fn build_top_down_postprocessor(
    max_individuals: usize,
    num_bodyparts: usize,
    num_unique_bodyparts: usize,
) -> Result<ComposePostprocessor> {
    let (keys_to_concatenate, empty_shapes, keys_to_rescale) =
        pose_keys(num_bodyparts, num_unique_bodyparts);

    Ok(ComposePostprocessor::new(vec![
        ConcatenateOutputs::with_empty_outputs(keys_to_concatenate, empty_shapes)?.into(),
        RescaleAndOffset::new(keys_to_rescale, RescaleMode::KeypointTd).into(),
        AddContextToOutput::new([ContextKey::Bboxes, ContextKey::BboxScores]).into(),
        PadOutputs::new(
            [
                (keys::BODYPARTS, max_individuals),
                (keys::BBOXES, max_individuals),
                (keys::BBOX_SCORES, max_individuals),
                (keys::UNIQUE_BODYPARTS, 0),
            ],
            DEFAULT_PAD_VALUE,
        )
        .into(),
    ]))
}

/// Create the postprocessor for a detector.
///
/// Concatenate `bboxes` and `bbox_scores` -> convert boxes to `xywh` -> rescale the
/// boxes ([`RescaleMode::BboxXywh`]). Frames without detections give `(0, 4)` boxes
/// and `(0,)` scores.
///
/// # Errors
///
/// Returns an error if a stage cannot be built.
pub fn build_detector_postprocessor() -> Result<ComposePostprocessor> {
    Ok(ComposePostprocessor::new(vec![
        ConcatenateOutputs::with_empty_outputs(
            [
                (keys::BBOXES, (heads::DETECTION, values::BBOXES)),
                (keys::BBOX_SCORES, (heads::DETECTION, values::SCORES)),
            ],
            [(keys::BBOXES, vec![4]), (keys::BBOX_SCORES, Vec::new())],
        )?
        .into(),
        BboxToCoco::new([keys::BBOXES]).into(),
        RescaleAndOffset::new([keys::BBOXES], RescaleMode::BboxXywh).into(),
    ]))
}

/// Create the default postprocessor for `task`.
///
/// Unlike the individual builders, this honours [`PostprocessConfig::pad_value`].
///
/// # Errors
///
/// Returns an error if a stage cannot be built.
pub fn build_postprocessor(task: Task, config: &PostprocessConfig) -> Result<Postprocessor> {
    let pipeline = match task {
        Task::BottomUp => build_bottom_up_postprocessor(
            config.max_individuals,
            config.num_bodyparts,
            config.num_unique_bodyparts,
        )?,
        Task::TopDown => build_top_down_postprocessor(
            config.max_individuals,
            config.num_bodyparts,
            config.num_unique_bodyparts,
        )?,
        Task::Detect => build_detector_postprocessor()?,
    };
    Ok(with_pad_value(pipeline, config.pad_value).into())
}

/// Replace the sentinel of every padding stage in `pipeline`.
fn with_pad_value(pipeline: ComposePostprocessor, pad_value: f32) -> ComposePostprocessor {
    let components = pipeline
        .components()
        .iter()
        .cloned()
        .map(|stage| match stage {
            Postprocessor::Pad(pad) => Postprocessor::Pad(pad.with_pad_value(pad_value)),
            other => other,
        })
        .collect();
    ComposePostprocessor::new(components)
}
