// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Task definitions for pose estimation models.
//!
//! The task decides how candidates are generated for a frame and therefore which
//! postprocessing pipeline turns the raw predictions into final outputs.

use std::fmt;
use std::str::FromStr;

/// Pose estimation task types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Task {
    /// Bottom-up - the pose model regresses keypoints for all individuals at once.
    #[default]
    BottomUp,
    /// Top-down - a detector proposes boxes, the pose model runs on one crop per box.
    TopDown,
    /// Detection only - bounding boxes and their scores.
    Detect,
}

impl Task {
    /// Returns the short code used in model configurations.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BottomUp => "BU",
            Self::TopDown => "TD",
            Self::Detect => "DT",
        }
    }

    /// Returns whether this task needs a detector to run before the pose model.
    #[must_use]
    pub const fn requires_detector(&self) -> bool {
        matches!(self, Self::TopDown)
    }

    /// Returns whether this task produces keypoints.
    #[must_use]
    pub const fn has_keypoints(&self) -> bool {
        matches!(self, Self::BottomUp | Self::TopDown)
    }

    /// Returns whether this task produces bounding boxes in its final outputs.
    #[must_use]
    pub const fn has_boxes(&self) -> bool {
        matches!(self, Self::TopDown | Self::Detect)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Task {
    type Err = TaskParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bu" | "bottom_up" | "bottom-up" | "bottomup" => Ok(Self::BottomUp),
            "td" | "top_down" | "top-down" | "topdown" => Ok(Self::TopDown),
            "dt" | "detect" | "detection" | "detector" => Ok(Self::Detect),
            _ => Err(TaskParseError(s.to_string())),
        }
    }
}

impl serde::Serialize for Task {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Task {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error returned when parsing an invalid task string.
#[derive(Debug, Clone)]
pub struct TaskParseError(String);

impl fmt::Display for TaskParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task '{}', expected one of: BU, TD, DT", self.0)
    }
}

impl std::error::Error for TaskParseError {}
