// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Integration tests for the pose inference library

use ndarray::{Array1, Array2, Array3, Axis, arr0, arr1, arr2};
use pose_inference::predictions::{heads, keys, values};
use pose_inference::{
    AnalysisConfig, CandidatePrediction, Context, InferenceRunner, PoseError, PostprocessConfig,
    Postprocessor, RawFrame, Task, build_bottom_up_postprocessor, build_detector_postprocessor,
    build_postprocessor, build_top_down_postprocessor, postprocess_frames, video_inference,
};

type ModelFn = fn(&Array3<u8>, Context) -> pose_inference::Result<(Vec<CandidatePrediction>, Context)>;

fn pose_candidate(rows: Array2<f32>) -> CandidatePrediction {
    CandidatePrediction::new().with(heads::BODYPART, values::POSES, rows.into_dyn())
}

#[allow(clippy::cast_precision_loss)]
fn five_bodyparts(seed: usize) -> Array2<f32> {
    Array2::from_shape_fn((5, 3), |(bpt, c)| if c == 2 { 0.5 } else { (seed * 10 + bpt) as f32 })
}

#[test]
fn test_bottom_up_end_to_end() {
    let pipeline = Postprocessor::from(build_bottom_up_postprocessor(4, 5, 0).unwrap());
    let candidates = vec![pose_candidate(five_bodyparts(1)), pose_candidate(five_bodyparts(2))];
    let context = Context::new().with_scale_offset([2.0, 3.0], [5.0, 7.0]);

    let (outputs, context) = pipeline.process(candidates, context).unwrap();
    let bodyparts = outputs.get(keys::BODYPARTS).unwrap();

    assert_eq!(bodyparts.shape(), &[4, 5, 3]);
    // x * 2 + 5, y * 3 + 7, likelihood untouched
    assert!((bodyparts[[0, 1, 0]] - 27.0).abs() < f32::EPSILON);
    assert!((bodyparts[[0, 1, 1]] - 40.0).abs() < f32::EPSILON);
    assert!((bodyparts[[1, 4, 0]] - 53.0).abs() < f32::EPSILON);
    assert!((bodyparts[[1, 4, 2]] - 0.5).abs() < f32::EPSILON);
    for row in 2..4 {
        assert!(bodyparts.index_axis(Axis(0), row).iter().all(|&v| (v + 1.0).abs() < f32::EPSILON));
    }
    assert!(!outputs.contains_key(keys::UNIQUE_BODYPARTS));
    assert_eq!(context.scales, Some(vec![[2.0, 3.0]]));
}

#[test]
fn test_bottom_up_empty_frame() {
    let pipeline = Postprocessor::from(build_bottom_up_postprocessor(3, 5, 2).unwrap());
    let (outputs, context) = pipeline.process(Vec::new(), Context::new()).unwrap();

    assert_eq!(outputs.get(keys::BODYPARTS).unwrap().shape(), &[3, 5, 3]);
    assert_eq!(outputs.get(keys::UNIQUE_BODYPARTS).unwrap().shape(), &[0, 2, 3]);
    assert_eq!(context, Context::new());
}

#[test]
fn test_top_down_end_to_end() {
    let pipeline = Postprocessor::from(build_top_down_postprocessor(4, 5, 0).unwrap());
    let candidates = vec![pose_candidate(five_bodyparts(0)), pose_candidate(five_bodyparts(1))];
    let bboxes = arr2(&[[100.0_f32, 50.0, 20.0, 40.0], [10.0, 10.0, 30.0, 30.0]]);
    let scores = arr1(&[0.9_f32, 0.7]);
    let context = Context::new()
        .with_crops(vec![[0.5, 0.5], [1.0, 2.0]], vec![[100.0, 50.0], [10.0, 10.0]])
        .with_bboxes(bboxes.clone(), scores);

    let (outputs, _) = pipeline.process(candidates, context).unwrap();
    let bodyparts = outputs.get(keys::BODYPARTS).unwrap();
    let out_bboxes = outputs.get(keys::BBOXES).unwrap();
    let out_scores = outputs.get(keys::BBOX_SCORES).unwrap();

    assert_eq!(bodyparts.shape(), &[4, 5, 3]);
    // individual 0: x * 0.5 + 100, individual 1: y * 2 + 10
    assert!((bodyparts[[0, 2, 0]] - 101.0).abs() < f32::EPSILON);
    assert!((bodyparts[[1, 2, 1]] - 34.0).abs() < f32::EPSILON);

    assert_eq!(out_bboxes.shape(), &[4, 4]);
    assert_eq!(out_bboxes.slice(ndarray::s![..2, ..]), bboxes.view());
    assert!(out_bboxes.slice(ndarray::s![2.., ..]).iter().all(|&v| (v + 1.0).abs() < f32::EPSILON));
    assert_eq!(out_scores.shape(), &[4]);
    assert!((out_scores[[1]] - 0.7).abs() < f32::EPSILON);
    assert!((out_scores[[3]] + 1.0).abs() < f32::EPSILON);
}

#[test]
fn test_top_down_crop_count_mismatch() {
    let pipeline = Postprocessor::from(build_top_down_postprocessor(4, 5, 0).unwrap());
    let candidates = (0..3).map(|i| pose_candidate(five_bodyparts(i))).collect();
    let context = Context::new().with_crops(vec![[1.0, 1.0]; 2], vec![[0.0, 0.0]; 2]);

    let result = pipeline.process(candidates, context);
    assert!(matches!(result, Err(PoseError::ShapeMismatch(_))));
}

#[test]
fn test_over_capacity_frame_is_rejected() {
    let pipeline = Postprocessor::from(build_bottom_up_postprocessor(1, 5, 0).unwrap());
    let candidates = vec![pose_candidate(five_bodyparts(0)), pose_candidate(five_bodyparts(1))];
    let result = pipeline.process(candidates, Context::new());
    assert!(matches!(result, Err(PoseError::ShapeMismatch(_))));
}

#[test]
fn test_detector_end_to_end() {
    let pipeline = Postprocessor::from(build_detector_postprocessor().unwrap());
    let detection = CandidatePrediction::new()
        .with(heads::DETECTION, values::BBOXES, arr1(&[10.0_f32, 20.0, 50.0, 80.0]).into_dyn())
        .with(heads::DETECTION, values::SCORES, arr0(0.95_f32).into_dyn());
    let context = Context::new().with_scale_offset([2.0, 2.0], [1.0, 1.0]);

    let (outputs, _) = pipeline.process(vec![detection], context).unwrap();
    let bboxes = outputs.get(keys::BBOXES).unwrap();

    // (10, 20, 50, 80) -> xywh (10, 20, 40, 60) -> scaled by 2, origin offset by 1
    let expected = arr2(&[[21.0_f32, 41.0, 80.0, 120.0]]).into_dyn();
    assert_eq!(bboxes, &expected);
    assert_eq!(outputs.get(keys::BBOX_SCORES).unwrap().shape(), &[1]);
}

#[test]
fn test_detector_without_detections() {
    let pipeline = Postprocessor::from(build_detector_postprocessor().unwrap());
    let context = Context::new().with_scale_offset([2.0, 2.0], [0.0, 0.0]);
    let (outputs, _) = pipeline.process(Vec::new(), context).unwrap();

    assert_eq!(outputs.get(keys::BBOXES).unwrap().shape(), &[0, 4]);
    assert_eq!(outputs.get(keys::BBOX_SCORES).unwrap().shape(), &[0]);
}

#[test]
fn test_batch_postprocessing_preserves_order() {
    let postprocessor = build_postprocessor(
        Task::BottomUp,
        &PostprocessConfig::new().with_max_individuals(2).with_num_bodyparts(5),
    )
    .unwrap();
    let frames: Vec<RawFrame> = (0..32)
        .map(|i| RawFrame {
            candidates: vec![pose_candidate(five_bodyparts(i))],
            context: Context::new(),
        })
        .collect();

    let outputs = postprocess_frames(&postprocessor, frames).unwrap();
    assert_eq!(outputs.len(), 32);
    for (i, frame) in outputs.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let expected = (i * 10) as f32;
        assert!((frame.get(keys::BODYPARTS).unwrap()[[0, 0, 0]] - expected).abs() < f32::EPSILON);
    }
}

#[test]
fn test_video_inference_bottom_up() {
    let config = AnalysisConfig::new()
        .with_bodyparts(["a", "b", "c", "d", "e"])
        .with_individuals(["m1", "m2", "m3"]);
    let model = |_: &Array3<u8>, context: Context| -> pose_inference::Result<(Vec<CandidatePrediction>, Context)> {
        Ok((
            vec![pose_candidate(five_bodyparts(1))],
            context.with_scale_offset([1.0, 1.0], [0.0, 0.0]),
        ))
    };
    let mut runner = InferenceRunner::for_task(model, Task::BottomUp, &config.postprocess_config()).unwrap();
    let frames = (0..4).map(|_| Array3::<u8>::zeros((16, 16, 3)));

    let result = video_inference(
        frames,
        Task::BottomUp,
        &mut runner,
        None::<&mut InferenceRunner<ModelFn>>,
    )
    .unwrap();

    assert_eq!(result.metadata.nframes, 4);
    assert!(result
        .predictions
        .iter()
        .all(|frame| frame.get(keys::BODYPARTS).unwrap().shape() == [3, 5, 3]));
    let scores = Array1::from_iter(
        result.predictions.iter().map(|frame| frame.get(keys::BODYPARTS).unwrap()[[0, 0, 2]]),
    );
    assert!(scores.iter().all(|&s| (s - 0.5).abs() < f32::EPSILON));
}
