// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Writing video predictions to disk.
//!
//! Three documents are produced for every analysed video:
//!
//! - a prediction table (`<stem><scorer>.csv`) with one row per frame,
//! - the full predictions (`<stem><scorer>_full.json`) with per-bodypart coordinates and
//!   confidences for every frame,
//! - the assemblies (`<stem><scorer>_assemblies.json`) with the keypoints of every
//!   individual.
//!
//! Video metadata goes next to them in `<stem><scorer>_meta.json`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2, ArrayView3, Axis, Ix3, s};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::error::{PoseError, Result};
use crate::predictions::{PoseOutputs, keys};

/// Coordinate labels of a keypoint.
pub const COORDS: [&str; 3] = ["x", "y", "likelihood"];

/// Individual name used for unique bodyparts in multi-animal projects.
pub const SINGLE: &str = "single";

/// Identity written in the assemblies when the model does not predict identities.
const NO_IDENTITY: f32 = -1.0;

/// Paths of the files written for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub table: PathBuf,
    pub full: PathBuf,
    pub assemblies: PathBuf,
    pub metadata: PathBuf,
}

impl ExportPaths {
    /// Output paths for a video named `stem`, analysed by `scorer`, written to `dir`.
    pub fn new(dir: impl AsRef<Path>, stem: &str, scorer: &str) -> Self {
        let dir = dir.as_ref();
        let prefix = format!("{stem}{scorer}");
        Self {
            table: dir.join(format!("{prefix}.csv")),
            full: dir.join(format!("{prefix}_full.json")),
            assemblies: dir.join(format!("{prefix}_assemblies.json")),
            metadata: dir.join(format!("{prefix}_meta.json")),
        }
    }

    /// Returns whether the video was already analysed.
    pub fn exists(&self) -> bool {
        self.table.exists() || self.metadata.exists()
    }
}

/// One column of a [`PredictionTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnKey {
    pub scorer: String,
    /// `None` in single-animal projects.
    pub individual: Option<String>,
    pub bodypart: String,
    pub coord: &'static str,
}

/// Keypoint predictions flattened to one row per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    columns: Vec<ColumnKey>,
    data: Array2<f32>,
}

impl PredictionTable {
    /// Build the table from per-frame outputs.
    ///
    /// Only the first `config.max_individuals()` rows of `bodyparts` are kept; pipeline
    /// outputs never exceed it, so this only applies to hand-built outputs. Individuals
    /// missing from a frame are filled with NaN. Unique bodyparts come after the
    /// bodyparts, read from the first row of `unique_bodyparts`.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::MissingKey`] if a frame has no `bodyparts`, or
    /// [`PoseError::ShapeMismatch`] if a keypoint array does not match the configuration.
    pub fn from_predictions(predictions: &[PoseOutputs], config: &AnalysisConfig) -> Result<Self> {
        let columns = columns(config);
        let individuals = config.max_individuals();
        let num_bodyparts = config.bodyparts.len();
        let num_unique = config.unique_bodyparts.len();
        let mut data = Array2::from_elem((predictions.len(), columns.len()), f32::NAN);

        for (mut row, outputs) in data.rows_mut().into_iter().zip(predictions) {
            let bodyparts = keypoints(outputs, keys::BODYPARTS, num_bodyparts)?
                .ok_or_else(|| PoseError::MissingKey(keys::BODYPARTS.to_string()))?;
            let kept = bodyparts.len_of(Axis(0)).min(individuals);
            for (idx, &value) in bodyparts.slice(s![..kept, .., ..3]).iter().enumerate() {
                row[idx] = value;
            }

            if num_unique > 0 {
                let offset = individuals * num_bodyparts * COORDS.len();
                if let Some(unique) = keypoints(outputs, keys::UNIQUE_BODYPARTS, num_unique)? {
                    if unique.len_of(Axis(0)) > 0 {
                        for (idx, &value) in unique.slice(s![0, .., ..3]).iter().enumerate() {
                            row[offset + idx] = value;
                        }
                    }
                }
            }
        }

        Ok(Self { columns, data })
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    /// Table values, shape `(frames, columns)`.
    pub const fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn num_frames(&self) -> usize {
        self.data.nrows()
    }

    /// Write the table as CSV.
    ///
    /// One header row per column level (`scorer`, `individuals` in multi-animal projects,
    /// `bodyparts`, `coords`), then one row per frame starting with the frame index. NaN
    /// values are written as empty cells.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(fs::File::create(path)?);
        writer.write_all(self.to_csv().as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Render the table as CSV text.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        let multi_animal = self.columns.iter().any(|c| c.individual.is_some());

        let mut levels: Vec<(&str, Vec<&str>)> =
            vec![("scorer", self.columns.iter().map(|c| c.scorer.as_str()).collect())];
        if multi_animal {
            levels.push((
                "individuals",
                self.columns.iter().map(|c| c.individual.as_deref().unwrap_or("")).collect(),
            ));
        }
        levels.push(("bodyparts", self.columns.iter().map(|c| c.bodypart.as_str()).collect()));
        levels.push(("coords", self.columns.iter().map(|c| c.coord).collect()));

        for (name, cells) in levels {
            csv.push_str(name);
            for cell in cells {
                csv.push(',');
                csv.push_str(&escape_cell(cell));
            }
            csv.push('\n');
        }

        for (idx, row) in self.data.rows().into_iter().enumerate() {
            csv.push_str(&idx.to_string());
            for value in row {
                csv.push(',');
                if !value.is_nan() {
                    csv.push_str(&value.to_string());
                }
            }
            csv.push('\n');
        }
        csv
    }
}

/// Quote a header cell holding a separator, a quote or a line break.
fn escape_cell(cell: &str) -> Cow<'_, str> {
    if cell.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", cell.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(cell)
    }
}

fn columns(config: &AnalysisConfig) -> Vec<ColumnKey> {
    let multi_animal = config.is_multi_animal();
    let column = |individual: Option<&str>, bodypart: &str, coord| ColumnKey {
        scorer: config.scorer.clone(),
        individual: individual.map(str::to_string),
        bodypart: bodypart.to_string(),
        coord,
    };

    let mut columns = Vec::new();
    for individual in &config.individuals {
        let individual = multi_animal.then_some(individual.as_str());
        for bodypart in &config.bodyparts {
            columns.extend(COORDS.iter().map(|&coord| column(individual, bodypart, coord)));
        }
    }
    let single = multi_animal.then_some(SINGLE);
    for bodypart in &config.unique_bodyparts {
        columns.extend(COORDS.iter().map(|&coord| column(single, bodypart, coord)));
    }
    columns
}

/// Keypoints stored under `key`, checked to be `(individuals, num_keypoints, >= 3)`.
fn keypoints<'a>(
    outputs: &'a PoseOutputs,
    key: &str,
    num_keypoints: usize,
) -> Result<Option<ArrayView3<'a, f32>>> {
    let Some(array) = outputs.get(key) else {
        return Ok(None);
    };
    let view = array.view().into_dimensionality::<Ix3>().map_err(|_| {
        PoseError::ShapeMismatch(format!(
            "'{key}' must have 3 dimensions, found shape {:?}",
            array.shape()
        ))
    })?;
    let (_, found, dim) = view.dim();
    if found != num_keypoints || dim < COORDS.len() {
        return Err(PoseError::ShapeMismatch(format!(
            "'{key}' must have shape (N, {num_keypoints}, 3), found {:?}",
            array.shape()
        )));
    }
    Ok(Some(view))
}

/// Metadata stored with the full predictions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullMetadata {
    /// Bodypart names, followed by the unique bodypart names.
    pub all_joints_names: Vec<String>,
    pub nframes: usize,
}

/// Predictions of one frame, bodypart-major.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FramePredictions {
    /// `coordinates[bodypart][individual] = [x, y]`.
    pub coordinates: Vec<Vec<[f32; 2]>>,
    /// `confidence[bodypart][individual]`.
    pub confidence: Vec<Vec<f32>>,
}

/// Every prediction of a video, keyed by `frameNNN`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullPredictions {
    pub metadata: FullMetadata,
    #[serde(flatten)]
    pub frames: BTreeMap<String, FramePredictions>,
}

impl FullPredictions {
    /// Build the full predictions from per-frame outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame has no `bodyparts` or a keypoint array does not match
    /// the configuration.
    pub fn from_predictions(predictions: &[PoseOutputs], config: &AnalysisConfig) -> Result<Self> {
        let width = frame_key_width(predictions.len());
        let mut frames = BTreeMap::new();

        for (idx, outputs) in predictions.iter().enumerate() {
            let bodyparts = keypoints(outputs, keys::BODYPARTS, config.bodyparts.len())?
                .ok_or_else(|| PoseError::MissingKey(keys::BODYPARTS.to_string()))?;
            let mut frame = FramePredictions {
                coordinates: Vec::new(),
                confidence: Vec::new(),
            };
            push_bodypart_major(&mut frame, bodyparts);
            if let Some(unique) =
                keypoints(outputs, keys::UNIQUE_BODYPARTS, config.unique_bodyparts.len())?
            {
                push_bodypart_major(&mut frame, unique);
            }
            frames.insert(format!("frame{idx:0width$}"), frame);
        }

        Ok(Self {
            metadata: FullMetadata {
                all_joints_names: config
                    .bodyparts
                    .iter()
                    .chain(&config.unique_bodyparts)
                    .cloned()
                    .collect(),
                nframes: predictions.len(),
            },
            frames,
        })
    }

    /// Write as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path, self)
    }
}

fn push_bodypart_major(frame: &mut FramePredictions, keypoints: ArrayView3<'_, f32>) {
    for bodypart in keypoints.axis_iter(Axis(1)) {
        frame.coordinates.push(bodypart.rows().into_iter().map(|kp| [kp[0], kp[1]]).collect());
        frame.confidence.push(bodypart.column(2).to_vec());
    }
}

/// Number of digits in frame keys: `ceil(log10(n))`.
fn frame_key_width(num_frames: usize) -> usize {
    if num_frames <= 1 {
        0
    } else {
        (num_frames - 1).to_string().len()
    }
}

/// Keypoints of every individual, `[x, y, likelihood, identity]` per keypoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assemblies {
    #[serde(flatten)]
    pub frames: BTreeMap<usize, Vec<Vec<[f32; 4]>>>,
    /// Unique bodyparts of each frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single: Option<BTreeMap<usize, Vec<[f32; 4]>>>,
}

impl Assemblies {
    /// Build the assemblies from per-frame outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame has no `bodyparts` or a keypoint array does not match
    /// the configuration.
    pub fn from_predictions(predictions: &[PoseOutputs], config: &AnalysisConfig) -> Result<Self> {
        let mut frames = BTreeMap::new();
        let mut single = (!config.unique_bodyparts.is_empty()).then(BTreeMap::new);

        for (idx, outputs) in predictions.iter().enumerate() {
            let bodyparts = keypoints(outputs, keys::BODYPARTS, config.bodyparts.len())?
                .ok_or_else(|| PoseError::MissingKey(keys::BODYPARTS.to_string()))?;
            frames.insert(
                idx,
                bodyparts.outer_iter().map(assembly).collect(),
            );

            if let Some(single) = single.as_mut() {
                if let Some(unique) =
                    keypoints(outputs, keys::UNIQUE_BODYPARTS, config.unique_bodyparts.len())?
                {
                    if let Some(first) = unique.outer_iter().next() {
                        single.insert(idx, assembly(first));
                    }
                }
            }
        }

        Ok(Self { frames, single })
    }

    /// Write as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path, self)
    }
}

fn assembly(keypoints: ArrayView2<'_, f32>) -> Vec<[f32; 4]> {
    keypoints
        .rows()
        .into_iter()
        .map(|kp| [kp[0], kp[1], kp[2], NO_IDENTITY])
        .collect()
}

pub(crate) fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let file = fs::File::create(path)
        .map_err(|e| PoseError::ExportError(format!("cannot create {}: {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn frame(individuals: usize, value: f32) -> PoseOutputs {
        let mut bodyparts = Array3::from_elem((individuals, 2, 3), value);
        bodyparts.slice_mut(s![.., .., 2]).fill(0.9);
        [(keys::BODYPARTS, bodyparts.into_dyn())].into_iter().collect()
    }

    fn multi_config() -> AnalysisConfig {
        AnalysisConfig::new()
            .with_scorer("DLC_net")
            .with_bodyparts(["nose", "tail"])
            .with_individuals(["m1", "m2"])
    }

    #[test]
    fn test_table_shape_and_truncation() {
        let predictions = vec![frame(3, 1.0), frame(3, 2.0)];
        let table = PredictionTable::from_predictions(&predictions, &multi_config()).unwrap();

        assert_eq!(table.data().dim(), (2, 12));
        assert_eq!(table.columns().len(), 12);
        assert_eq!(table.columns()[6].individual.as_deref(), Some("m2"));
        assert_eq!(table.columns()[6].bodypart, "nose");
        assert!((table.data()[[1, 0]] - 2.0).abs() < f32::EPSILON);
        assert!((table.data()[[1, 2]] - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_table_missing_individuals_are_nan() {
        let table = PredictionTable::from_predictions(&[frame(1, 1.0)], &multi_config()).unwrap();
        assert!(table.data()[[0, 5]].is_finite());
        assert!(table.data()[[0, 6]].is_nan());
    }

    #[test]
    fn test_single_animal_csv_header() {
        let config = AnalysisConfig::new().with_scorer("DLC").with_bodyparts(["nose", "tail"]);
        let table = PredictionTable::from_predictions(&[frame(1, 5.0)], &config).unwrap();
        let csv = table.to_csv();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "scorer,DLC,DLC,DLC,DLC,DLC,DLC");
        assert_eq!(lines[1], "bodyparts,nose,nose,nose,tail,tail,tail");
        assert_eq!(lines[2], "coords,x,y,likelihood,x,y,likelihood");
        assert_eq!(lines[3], "0,5,5,0.9,5,5,0.9");
    }

    #[test]
    fn test_multi_animal_csv_unique_bodyparts() {
        let config = multi_config().with_unique_bodyparts(["corner"]);
        let mut outputs = frame(2, 1.0);
        outputs.insert(keys::UNIQUE_BODYPARTS, Array3::from_elem((1, 1, 3), 4.0_f32).into_dyn());
        let table = PredictionTable::from_predictions(&[outputs], &config).unwrap();
        let csv = table.to_csv();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("individuals,m1,m1"));
        assert!(lines[1].ends_with("single,single,single"));
        assert!(lines[4].ends_with(",4,4,4"));
    }

    #[test]
    fn test_csv_quotes_header_cells() {
        let config = AnalysisConfig::new()
            .with_scorer("DLC \"v2\"")
            .with_bodyparts(["left,ear", "tail"]);
        let table = PredictionTable::from_predictions(&[frame(1, 5.0)], &config).unwrap();
        let csv = table.to_csv();
        let lines: Vec<&str> = csv.lines().collect();

        assert!(lines[0].starts_with(r#"scorer,"DLC ""v2""","DLC ""v2""","#));
        assert_eq!(lines[1], r#"bodyparts,"left,ear","left,ear","left,ear",tail,tail,tail"#);
        assert_eq!(lines[2], "coords,x,y,likelihood,x,y,likelihood");
        assert_eq!(lines[3], "0,5,5,0.9,5,5,0.9");
        assert_eq!(escape_cell("nose"), "nose");
    }

    #[test]
    fn test_table_requires_bodyparts() {
        let result = PredictionTable::from_predictions(&[PoseOutputs::new()], &multi_config());
        assert!(matches!(result, Err(PoseError::MissingKey(_))));
    }

    #[test]
    fn test_frame_key_width() {
        assert_eq!(frame_key_width(1), 0);
        assert_eq!(frame_key_width(10), 1);
        assert_eq!(frame_key_width(11), 2);
        assert_eq!(frame_key_width(100), 2);
        assert_eq!(frame_key_width(101), 3);
    }

    #[test]
    fn test_full_predictions_keys_and_layout() {
        let predictions: Vec<PoseOutputs> = (0..11).map(|_| frame(2, 3.0)).collect();
        let full = FullPredictions::from_predictions(&predictions, &multi_config()).unwrap();

        assert_eq!(full.metadata.nframes, 11);
        assert!(full.frames.contains_key("frame00"));
        assert!(full.frames.contains_key("frame10"));
        let first = &full.frames["frame00"];
        assert_eq!(first.coordinates.len(), 2);
        assert_eq!(first.coordinates[0].len(), 2);
        assert_eq!(first.confidence[1], vec![0.9, 0.9]);
    }

    #[test]
    fn test_assemblies_identity_column() {
        let config = multi_config().with_unique_bodyparts(["corner"]);
        let mut outputs = frame(2, 1.0);
        outputs.insert(keys::UNIQUE_BODYPARTS, Array3::from_elem((1, 1, 3), 4.0_f32).into_dyn());
        let assemblies = Assemblies::from_predictions(&[outputs], &config).unwrap();

        assert_eq!(assemblies.frames[&0].len(), 2);
        assert_eq!(assemblies.frames[&0][1][0], [1.0, 1.0, 0.9, -1.0]);
        assert_eq!(assemblies.single.as_ref().unwrap()[&0], vec![[4.0, 4.0, 4.0, -1.0]]);
    }

    #[test]
    fn test_write_all_exports() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ExportPaths::new(dir.path(), "video", "DLC_net");
        let predictions = vec![frame(2, 1.0)];
        let config = multi_config();

        PredictionTable::from_predictions(&predictions, &config)
            .unwrap()
            .write_csv(&paths.table)
            .unwrap();
        FullPredictions::from_predictions(&predictions, &config)
            .unwrap()
            .save(&paths.full)
            .unwrap();
        Assemblies::from_predictions(&predictions, &config)
            .unwrap()
            .save(&paths.assemblies)
            .unwrap();

        assert!(paths.exists());
        assert!(paths.table.ends_with("videoDLC_net.csv"));
        let full: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.full).unwrap()).unwrap();
        assert_eq!(full["metadata"]["nframes"], 1);
        assert!(full.get("frame0").is_some());
        let assemblies: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.assemblies).unwrap()).unwrap();
        assert!(assemblies.get("0").is_some());
    }
}
