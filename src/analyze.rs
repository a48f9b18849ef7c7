// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Video analysis: run the models over every frame and export the predictions.

use std::fs;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use ndarray::{Ix1, Ix2};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::context::Context;
use crate::error::{PoseError, Result};
use crate::export::{Assemblies, ExportPaths, FullPredictions, PredictionTable, write_json};
use crate::predictions::{PoseOutputs, keys};
use crate::runner::{Frame, InferenceRunner, PoseModel};
use crate::task::Task;
use crate::{info, section, success, verbose, warn};

/// Information about an analysed video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub nframes: usize,
    /// `(width, height)` of the first frame.
    pub frame_dimensions: Option<(usize, usize)>,
    /// Start of the analysis, in seconds since the Unix epoch.
    pub start: f64,
    /// End of the analysis, in seconds since the Unix epoch.
    pub stop: f64,
    /// Wall-clock duration of the analysis, in seconds.
    pub run_duration: f64,
    pub task: Task,
}

/// Per-frame outputs of a video.
#[derive(Debug, Clone)]
pub struct VideoPredictions {
    pub predictions: Vec<PoseOutputs>,
    pub metadata: VideoMetadata,
}

/// Turn the postprocessed outputs of a detector into the context of a top-down pose model.
///
/// # Errors
///
/// Returns [`PoseError::MissingKey`] if the detector outputs lack `bboxes` or
/// `bbox_scores`, and [`PoseError::ShapeMismatch`] if they are not `(N, 4)` and `(N,)`.
pub fn detections_to_context(detections: &PoseOutputs) -> Result<Context> {
    let bboxes = detections
        .require(keys::BBOXES)?
        .clone()
        .into_dimensionality::<Ix2>()?;
    let scores = detections
        .require(keys::BBOX_SCORES)?
        .clone()
        .into_dimensionality::<Ix1>()?;
    if bboxes.nrows() != scores.len() {
        return Err(PoseError::ShapeMismatch(format!(
            "found {} bounding boxes but {} scores",
            bboxes.nrows(),
            scores.len()
        )));
    }
    Ok(Context::new().with_bboxes(bboxes, scores))
}

/// Run pose estimation on every frame of a video.
///
/// For top-down models each frame first goes through `detector_runner`, whose boxes
/// become the context of the pose model. Bottom-up models and detectors ignore
/// `detector_runner`.
///
/// # Errors
///
/// Returns [`PoseError::ConfigError`] for a top-down task without a detector, or the
/// first error raised while processing a frame.
pub fn video_inference<I, P, D>(
    frames: I,
    task: Task,
    pose_runner: &mut InferenceRunner<P>,
    mut detector_runner: Option<&mut InferenceRunner<D>>,
) -> Result<VideoPredictions>
where
    I: IntoIterator<Item = Frame>,
    P: PoseModel,
    D: PoseModel,
{
    if task.requires_detector() && detector_runner.is_none() {
        return Err(PoseError::ConfigError(
            "Must use a detector for top-down video analysis".to_string(),
        ));
    }

    let start = unix_seconds();
    let timer = Instant::now();
    let mut frame_dimensions = None;
    let mut predictions = Vec::new();

    for (idx, frame) in frames.into_iter().enumerate() {
        if frame_dimensions.is_none() {
            let (height, width, _) = frame.dim();
            frame_dimensions = Some((width, height));
        }

        let context = match detector_runner.as_deref_mut() {
            Some(detector) if task.requires_detector() => {
                let detections = detector.predict(&frame, Context::new())?;
                detections_to_context(&detections)?
            }
            _ => Context::new(),
        };

        let outputs = pose_runner.predict(&frame, context)?;
        if let Some(n) = outputs.num_candidates(keys::BBOXES) {
            verbose!("frame {idx}: {n} detections");
        }
        predictions.push(outputs);
    }

    let run_duration = timer.elapsed().as_secs_f64();
    Ok(VideoPredictions {
        metadata: VideoMetadata {
            nframes: predictions.len(),
            frame_dimensions,
            start,
            stop: start + run_duration,
            run_duration,
            task,
        },
        predictions,
    })
}

/// Analyse a video and export its predictions.
///
/// Outputs go to `output_dir`, or next to the video when it is `None`. A video whose
/// prediction table already exists is skipped unless [`AnalysisConfig::overwrite`] is set.
/// Returns the paths that were written, or `None` if the video was skipped.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, inference fails, or the exports
/// cannot be written.
pub fn analyze_video<I, P, D>(
    frames: I,
    video: &Path,
    output_dir: Option<&Path>,
    config: &AnalysisConfig,
    pose_runner: &mut InferenceRunner<P>,
    detector_runner: Option<&mut InferenceRunner<D>>,
) -> Result<Option<ExportPaths>>
where
    I: IntoIterator<Item = Frame>,
    P: PoseModel,
    D: PoseModel,
{
    config.validate()?;
    let stem = video
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PoseError::ConfigError(format!("invalid video path {}", video.display())))?;
    let dir = output_dir
        .or_else(|| video.parent())
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let paths = ExportPaths::new(dir, stem, &config.scorer);
    if paths.exists() && !config.overwrite {
        warn!(
            "Video {} already analyzed, found {}. Set overwrite to analyze it again.",
            video.display(),
            paths.table.display()
        );
        return Ok(None);
    }

    section!("Analyzing video {}", video.display());
    let result = video_inference(frames, config.task, pose_runner, detector_runner)?;
    info!(
        "Processed {} frames in {:.1}s ({:.1}ms per frame)",
        result.metadata.nframes,
        result.metadata.run_duration,
        pose_runner.stats().per_frame_ms()
    );

    fs::create_dir_all(dir)?;
    save_predictions(&result, config, &paths)?;
    success!("Results saved to {}", paths.table.display());
    Ok(Some(paths))
}

/// Write the prediction table, full predictions, assemblies and metadata of a video.
///
/// Assemblies are only written for multi-animal projects.
///
/// # Errors
///
/// Returns an error if the predictions do not match the configuration or a file cannot be
/// written.
pub fn save_predictions(
    result: &VideoPredictions,
    config: &AnalysisConfig,
    paths: &ExportPaths,
) -> Result<()> {
    if !config.task.has_keypoints() {
        warn!("{} predictions have no keypoints, only metadata is saved", config.task);
        return write_json(&paths.metadata, &result.metadata);
    }

    PredictionTable::from_predictions(&result.predictions, config)?.write_csv(&paths.table)?;
    FullPredictions::from_predictions(&result.predictions, config)?.save(&paths.full)?;
    if config.is_multi_animal() {
        Assemblies::from_predictions(&result.predictions, config)?.save(&paths.assemblies)?;
    }
    write_json(&paths.metadata, &result.metadata)
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PostprocessConfig;
    use crate::predictions::{CandidatePrediction, heads, values};
    use ndarray::{Array1, Array2, Array3, arr0, arr1, arr2};

    type ModelFn = fn(&Frame, Context) -> Result<(Vec<CandidatePrediction>, Context)>;

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(|_| Array3::zeros((48, 64, 3))).collect()
    }

    fn detector(_: &Frame, context: Context) -> Result<(Vec<CandidatePrediction>, Context)> {
        let detection = |x: f32| {
            CandidatePrediction::new()
                .with(heads::DETECTION, values::BBOXES, arr1(&[x, 0.0, x + 10.0, 20.0]).into_dyn())
                .with(heads::DETECTION, values::SCORES, arr0(0.8_f32).into_dyn())
        };
        Ok((vec![detection(0.0), detection(30.0)], context.with_scale_offset([1.0, 1.0], [0.0, 0.0])))
    }

    /// Top-down model returning one pose per box, in crop coordinates.
    fn top_down(_: &Frame, context: Context) -> Result<(Vec<CandidatePrediction>, Context)> {
        let bboxes = context.bboxes.clone().unwrap_or_else(|| Array2::zeros((0, 4)));
        let scores = context.bbox_scores.clone().unwrap_or_else(|| Array1::zeros(0));
        let candidates = (0..bboxes.nrows())
            .map(|_| {
                CandidatePrediction::new().with(
                    heads::BODYPART,
                    values::POSES,
                    arr2(&[[1.0_f32, 1.0, 0.5], [2.0, 2.0, 0.5]]).into_dyn(),
                )
            })
            .collect();
        let offsets = bboxes.rows().into_iter().map(|b| [b[0], b[1]]).collect();
        let scales = vec![[1.0, 1.0]; bboxes.nrows()];
        Ok((candidates, Context::new().with_crops(scales, offsets).with_bboxes(bboxes, scores)))
    }

    fn td_config() -> PostprocessConfig {
        PostprocessConfig::new().with_max_individuals(3).with_num_bodyparts(2)
    }

    #[test]
    fn test_top_down_requires_detector() {
        let mut pose = InferenceRunner::for_task(top_down as ModelFn, Task::TopDown, &td_config()).unwrap();
        let result = video_inference(frames(1), Task::TopDown, &mut pose, None::<&mut InferenceRunner<ModelFn>>);
        assert!(matches!(result, Err(PoseError::ConfigError(_))));
    }

    #[test]
    fn test_top_down_video_inference() {
        let mut detector = InferenceRunner::for_task(detector as ModelFn, Task::Detect, &td_config()).unwrap();
        let mut pose = InferenceRunner::for_task(top_down as ModelFn, Task::TopDown, &td_config()).unwrap();

        let result = video_inference(frames(3), Task::TopDown, &mut pose, Some(&mut detector)).unwrap();
        assert_eq!(result.metadata.nframes, 3);
        assert_eq!(result.metadata.frame_dimensions, Some((64, 48)));

        let first = &result.predictions[0];
        let bodyparts = first.get(keys::BODYPARTS).unwrap();
        let bboxes = first.get(keys::BBOXES).unwrap();
        assert_eq!(bodyparts.shape(), &[3, 2, 3]);
        assert_eq!(bboxes.shape(), &[3, 4]);
        // second individual is offset by its box origin
        assert!((bodyparts[[1, 0, 0]] - 31.0).abs() < f32::EPSILON);
        // boxes were converted to xywh by the detector pipeline
        assert!((bboxes[[1, 2]] - 10.0).abs() < f32::EPSILON);
        assert!((bboxes[[2, 0]] + 1.0).abs() < f32::EPSILON);
        assert_eq!(detector.stats().frames, 3);
    }

    #[test]
    fn test_detections_to_context_rejects_mismatch() {
        let detections: PoseOutputs = [
            (keys::BBOXES, Array2::<f32>::zeros((2, 4)).into_dyn()),
            (keys::BBOX_SCORES, Array1::<f32>::zeros(1).into_dyn()),
        ]
        .into_iter()
        .collect();
        assert!(matches!(detections_to_context(&detections), Err(PoseError::ShapeMismatch(_))));
        assert!(matches!(detections_to_context(&PoseOutputs::new()), Err(PoseError::MissingKey(_))));
    }

    #[test]
    fn test_single_animal_skips_assemblies() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig::new().with_bodyparts(["nose", "tail"]);
        let bodyparts = Array3::from_elem((1, 2, 3), 0.5_f32).into_dyn();
        let result = VideoPredictions {
            predictions: vec![[(keys::BODYPARTS, bodyparts)].into_iter().collect()],
            metadata: VideoMetadata {
                nframes: 1,
                frame_dimensions: None,
                start: 0.0,
                stop: 0.0,
                run_duration: 0.0,
                task: Task::BottomUp,
            },
        };
        let paths = ExportPaths::new(dir.path(), "video", &config.scorer);

        save_predictions(&result, &config, &paths).unwrap();
        assert!(paths.table.exists());
        assert!(paths.full.exists());
        assert!(paths.metadata.exists());
        assert!(!paths.assemblies.exists());
    }

    #[test]
    fn test_analyze_video_writes_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("mouse.mp4");
        let config = AnalysisConfig::new()
            .with_scorer("DLC_test")
            .with_task(Task::TopDown)
            .with_bodyparts(["nose", "tail"])
            .with_individuals(["a", "b", "c"]);
        let mut detector = InferenceRunner::for_task(detector as ModelFn, Task::Detect, &td_config()).unwrap();
        let mut pose = InferenceRunner::for_task(top_down as ModelFn, Task::TopDown, &config.postprocess_config()).unwrap();

        let paths = analyze_video(frames(2), &video, None, &config, &mut pose, Some(&mut detector))
            .unwrap()
            .unwrap();
        assert!(paths.table.exists());
        assert!(paths.full.exists());
        assert!(paths.assemblies.exists());
        assert!(paths.metadata.exists());

        let skipped = analyze_video(frames(2), &video, None, &config, &mut pose, Some(&mut detector)).unwrap();
        assert!(skipped.is_none());

        let config = config.with_overwrite(true);
        let rerun = analyze_video(frames(2), &video, None, &config, &mut pose, Some(&mut detector)).unwrap();
        assert_eq!(rerun, Some(paths));
    }
}
