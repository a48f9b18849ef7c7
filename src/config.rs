// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Postprocessing and analysis configuration.
//!
//! [`PostprocessConfig`] holds the numbers the pipeline builders need.
//! [`AnalysisConfig`] describes a project (bodypart and individual names, scorer) and
//! drives video analysis and export. Both use a builder pattern and can be read from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoseError, Result};
use crate::task::Task;

/// Sentinel written into padding rows.
pub const DEFAULT_PAD_VALUE: f32 = -1.0;

/// Configuration for the postprocessing pipeline builders.
///
/// # Example
///
/// ```rust
/// use pose_inference::PostprocessConfig;
///
/// let config = PostprocessConfig::new()
///     .with_max_individuals(3)
///     .with_num_bodyparts(12)
///     .with_num_unique_bodyparts(2);
/// assert_eq!(config.max_individuals, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    /// Maximum number of individuals in a single frame; keypoint outputs are padded to it.
    pub max_individuals: usize,
    /// Number of bodyparts predicted for every individual.
    pub num_bodyparts: usize,
    /// Number of unique bodyparts (`0` if the model has no unique bodypart head).
    pub num_unique_bodyparts: usize,
    /// Value used for padding rows.
    pub pad_value: f32,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            max_individuals: 1,
            num_bodyparts: 0,
            num_unique_bodyparts: 0,
            pad_value: DEFAULT_PAD_VALUE,
        }
    }
}

impl PostprocessConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of individuals per frame.
    #[must_use]
    pub const fn with_max_individuals(mut self, max_individuals: usize) -> Self {
        self.max_individuals = max_individuals;
        self
    }

    /// Set the number of bodyparts.
    #[must_use]
    pub const fn with_num_bodyparts(mut self, num_bodyparts: usize) -> Self {
        self.num_bodyparts = num_bodyparts;
        self
    }

    /// Set the number of unique bodyparts.
    #[must_use]
    pub const fn with_num_unique_bodyparts(mut self, num_unique_bodyparts: usize) -> Self {
        self.num_unique_bodyparts = num_unique_bodyparts;
        self
    }

    /// Set the padding sentinel.
    #[must_use]
    pub const fn with_pad_value(mut self, pad_value: f32) -> Self {
        self.pad_value = pad_value;
        self
    }
}

/// Project-level configuration for video analysis and export.
///
/// # Example
///
/// ```rust
/// use pose_inference::{AnalysisConfig, Task};
///
/// let config = AnalysisConfig::new()
///     .with_task(Task::TopDown)
///     .with_bodyparts(["nose", "tail"])
///     .with_individuals(["mouse1", "mouse2"]);
/// assert_eq!(config.postprocess_config().max_individuals, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Name of the model that produced the predictions; used in column headers and file names.
    pub scorer: String,
    /// Inference task.
    pub task: Task,
    /// Names of the bodyparts shared by every individual.
    pub bodyparts: Vec<String>,
    /// Names of the unique bodyparts.
    pub unique_bodyparts: Vec<String>,
    /// Names of the individuals; its length is the maximum number of individuals.
    pub individuals: Vec<String>,
    /// Value used for padding rows.
    pub pad_value: f32,
    /// Overwrite existing exports instead of skipping the video.
    pub overwrite: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            scorer: "DLC".to_string(),
            task: Task::default(),
            bodyparts: Vec::new(),
            unique_bodyparts: Vec::new(),
            individuals: vec!["animal".to_string()],
            pad_value: DEFAULT_PAD_VALUE,
            overwrite: false,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the configuration is
    /// invalid (see [`AnalysisConfig::validate`]).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive an analysis.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ConfigError`] if there are no individuals, no bodyparts for a
    /// keypoint task, or if names are repeated.
    pub fn validate(&self) -> Result<()> {
        if self.individuals.is_empty() {
            return Err(PoseError::ConfigError("at least one individual is required".to_string()));
        }
        if self.task.has_keypoints() && self.bodyparts.is_empty() && self.unique_bodyparts.is_empty() {
            return Err(PoseError::ConfigError("no bodyparts configured".to_string()));
        }
        for (kind, names) in [
            ("bodypart", &self.bodyparts),
            ("unique bodypart", &self.unique_bodyparts),
            ("individual", &self.individuals),
        ] {
            if let Some(dup) = names.iter().enumerate().find_map(|(i, name)| {
                names[..i].contains(name).then_some(name)
            }) {
                return Err(PoseError::ConfigError(format!("duplicate {kind} name '{dup}'")));
            }
        }
        Ok(())
    }

    /// Set the scorer name.
    #[must_use]
    pub fn with_scorer(mut self, scorer: impl Into<String>) -> Self {
        self.scorer = scorer.into();
        self
    }

    /// Set the task.
    #[must_use]
    pub const fn with_task(mut self, task: Task) -> Self {
        self.task = task;
        self
    }

    /// Set the bodypart names.
    #[must_use]
    pub fn with_bodyparts<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.bodyparts = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the unique bodypart names.
    #[must_use]
    pub fn with_unique_bodyparts<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.unique_bodyparts = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the individual names.
    #[must_use]
    pub fn with_individuals<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.individuals = names.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable overwriting existing exports.
    #[must_use]
    pub const fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Maximum number of individuals per frame.
    #[must_use]
    pub fn max_individuals(&self) -> usize {
        self.individuals.len()
    }

    /// Returns whether the project tracks more than one individual.
    #[must_use]
    pub fn is_multi_animal(&self) -> bool {
        self.individuals.len() > 1
    }

    /// Derive the postprocessing configuration for this project.
    #[must_use]
    pub fn postprocess_config(&self) -> PostprocessConfig {
        PostprocessConfig::new()
            .with_max_individuals(self.max_individuals())
            .with_num_bodyparts(self.bodyparts.len())
            .with_num_unique_bodyparts(self.unique_bodyparts.len())
            .with_pad_value(self.pad_value)
    }
}
