use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Defines what the tracker config file should contain.
pub struct Config {
    /// The weight of the overlap term `1 - IoU` for Active tracks.
    pub iou_weight: f64,
    /// The weight of the appearance distance term.
    pub appearance_weight: f64,
    /// The weight of the overlap term for Inactive tracks. Their last box may
    /// be stale, so re-identification leans on appearance.
    pub inactive_iou_weight: f64,
    /// Pairs whose IoU is below this value are never matched. Boxes with no
    /// overlap at all are always rejected, even when this is zero.
    pub min_iou: f64,
    /// Matched pairs whose combined cost exceeds this value are rejected.
    pub acceptance_threshold: f64,
    /// The number of unmatched frames an Active track tolerates before it
    /// becomes Inactive.
    pub active_patience: u32,
    /// The number of unmatched frames after which an Inactive track is killed.
    pub inactive_patience: u32,
    /// The minimum detection score to start a new track.
    pub new_track_threshold: f64,
    /// Blend factor for the stored embedding on a match. `1.0` replaces it.
    pub embedding_update_rate: f64,
    /// The distance used between appearance embeddings.
    pub appearance_metric: AppearanceMetric,
    /// How a track's box is predicted into the current frame.
    pub motion_model: MotionModel,
    /// Expected embedding length. When unset, the first embedding seen in a
    /// sequence fixes it.
    pub embedding_dim: Option<usize>,
    /// Fill gaps in finished trajectories before they are written.
    pub interpolate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppearanceMetric {
    Cosine,
    Euclidean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionModel {
    /// The predicted box is the last observed box.
    Static,
    /// The last two observations are extrapolated linearly per frame.
    ConstantVelocity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iou_weight: 0.5,
            appearance_weight: 0.5,
            inactive_iou_weight: 0.0,
            min_iou: 0.1,
            acceptance_threshold: 0.7,
            active_patience: 1,
            inactive_patience: 10,
            new_track_threshold: 0.5,
            embedding_update_rate: 1.0,
            appearance_metric: AppearanceMetric::Cosine,
            motion_model: MotionModel::ConstantVelocity,
            embedding_dim: None,
            interpolate: true,
        }
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks every threshold and weight. Called before any sequence is
    /// processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("iou_weight", self.iou_weight),
            ("appearance_weight", self.appearance_weight),
            ("inactive_iou_weight", self.inactive_iou_weight),
            ("acceptance_threshold", self.acceptance_threshold),
        ];
        for (field, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be a finite non-negative number, got {value}"),
                ));
            }
        }

        if self.iou_weight == 0.0 && self.appearance_weight == 0.0 {
            return Err(ConfigError::invalid(
                "iou_weight",
                "iou_weight and appearance_weight cannot both be zero",
            ));
        }

        let unit_ranges = [
            ("min_iou", self.min_iou),
            ("new_track_threshold", self.new_track_threshold),
        ];
        for (field, value) in unit_ranges {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(
                    field,
                    format!("must lie in [0, 1], got {value}"),
                ));
            }
        }

        let rate = self.embedding_update_rate;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(ConfigError::invalid(
                "embedding_update_rate",
                format!("must lie in (0, 1], got {rate}"),
            ));
        }

        if self.embedding_dim == Some(0) {
            return Err(ConfigError::invalid(
                "embedding_dim",
                "embeddings must have at least one dimension",
            ));
        }

        Ok(())
    }
}
