// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Pose Inference Library
//!
//! Postprocessing for pose estimation models: turns the raw per-candidate outputs of a
//! bottom-up, top-down or detector model into fixed-size per-frame arrays in image
//! coordinates, and exports video predictions to disk.
//!
//! ## Features
//!
//! - **Composable stages** - concatenate, rescale, pad, convert boxes, copy context
//! - **Default pipelines** - one builder per task (bottom-up, top-down, detector)
//! - **Model agnostic** - any model plugs in through the [`PoseModel`] trait
//! - **Parallel batches** - independent frames are postprocessed with rayon
//! - **Exports** - prediction table (CSV), full predictions and assemblies (JSON)
//!
//! ## Quick Start (Library)
//!
//! ```rust
//! use ndarray::arr2;
//! use pose_inference::predictions::{heads, keys, values};
//! use pose_inference::{CandidatePrediction, Context, build_bottom_up_postprocessor};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 4 individuals max, 2 bodyparts, no unique bodyparts
//!     let pipeline = build_bottom_up_postprocessor(4, 2, 0)?;
//!
//!     let candidate = CandidatePrediction::new().with(
//!         heads::BODYPART,
//!         values::POSES,
//!         arr2(&[[10.0_f32, 20.0, 0.9], [30.0, 40.0, 0.8]]).into_dyn(),
//!     );
//!     // The model resized the frame by half
//!     let context = Context::new().with_scale_offset([2.0, 2.0], [0.0, 0.0]);
//!
//!     let (outputs, _) = pose_inference::Postprocessor::from(pipeline)
//!         .process(vec![candidate], context)?;
//!     let bodyparts = outputs.require(keys::BODYPARTS)?;
//!     assert_eq!(bodyparts.shape(), &[4, 2, 3]);
//!     assert_eq!(bodyparts[[0, 0, 0]], 20.0);
//!     assert_eq!(bodyparts[[3, 0, 0]], -1.0);
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! The `pose-inference` CLI postprocesses raw model outputs dumped as JSON:
//!
//! ```bash
//! pose-inference postprocess --input video_raw.json --config project.json
//! pose-inference postprocess -i video_raw.json -c project.json --task td --overwrite
//! ```
//!
//! ## Custom Configuration
//!
//! ```rust
//! use pose_inference::{AnalysisConfig, Task, build_postprocessor};
//!
//! let config = AnalysisConfig::new()
//!     .with_scorer("DLC_resnet50")
//!     .with_task(Task::TopDown)
//!     .with_bodyparts(["nose", "left_ear", "right_ear", "tail"])
//!     .with_individuals(["mouse1", "mouse2", "mouse3"]);
//!
//! let postprocessor = build_postprocessor(config.task, &config.postprocess_config()).unwrap();
//! assert_eq!(postprocessor.name(), "ComposePostprocessor");
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`postprocessing`] | [`Postprocessor`] stages and the default pipelines |
//! | [`predictions`] | [`CandidatePrediction`], [`PoseOutputs`] and their keys |
//! | [`context`] | Per-frame [`Context`] (scales, offsets, boxes) |
//! | [`runner`] | [`PoseModel`] trait and [`InferenceRunner`] |
//! | [`analyze`] | Video analysis |
//! | [`export`] | Prediction table, full predictions and assemblies |
//! | [`config`] | [`PostprocessConfig`] and [`AnalysisConfig`] |
//! | [`task`] | [`Task`]: bottom-up, top-down, detection |
//! | [`error`] | Error types ([`PoseError`], [`Result`]) |
//!
//! ## License
//!
//! This project is licensed under [AGPL-3.0](https://ultralytics.com/license).

// Modules
pub mod analyze;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod logging;
pub mod postprocessing;
pub mod predictions;
pub mod runner;
pub mod task;

// Re-export main types for convenience
pub use analyze::{VideoMetadata, VideoPredictions, analyze_video, video_inference};
pub use config::{AnalysisConfig, DEFAULT_PAD_VALUE, PostprocessConfig};
pub use context::{Context, ContextKey};
pub use error::{PoseError, Result};
pub use predictions::{CandidatePrediction, PoseOutputs, Predictions};
pub use runner::{Frame, InferenceRunner, PoseModel, RawFrame, postprocess_frames};
pub use task::Task;

// Re-export the pipeline
pub use postprocessing::{
    AddContextToOutput, BboxToCoco, ComposePostprocessor, ConcatenateOutputs, PadOutputs,
    Postprocessor, RescaleAndOffset, RescaleMode, build_bottom_up_postprocessor,
    build_detector_postprocessor, build_postprocessor, build_top_down_postprocessor,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "pose-inference");
    }
}
