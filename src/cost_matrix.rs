use crate::{
    config::{AppearanceMetric, Config, MotionModel},
    detection::Detection,
    track::{Track, TrackId, TrackState},
};
use nalgebra::{DMatrix, DVector};

/// Pairwise association costs, one row per track and one column per
/// detection. Gated pairs hold `f64::INFINITY`.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    pub costs: DMatrix<f64>,
    pub track_ids: Vec<TrackId>,
}

pub struct CostMatrixBuilder {
    iou_weight: f64,
    inactive_iou_weight: f64,
    appearance_weight: f64,
    min_iou: f64,
    appearance_metric: AppearanceMetric,
    motion_model: MotionModel,
}

impl CostMatrixBuilder {
    pub fn new(config: &Config) -> Self {
        let Config {
            iou_weight,
            inactive_iou_weight,
            appearance_weight,
            min_iou,
            appearance_metric,
            motion_model,
            ..
        } = *config;

        Self {
            iou_weight,
            inactive_iou_weight,
            appearance_weight,
            min_iou,
            appearance_metric,
            motion_model,
        }
    }

    pub fn build(&self, tracks: &[Track], detections: &[Detection], frame: u64) -> CostMatrix {
        let track_ids = tracks.iter().map(Track::id).collect();
        let mut costs = DMatrix::from_element(tracks.len(), detections.len(), f64::INFINITY);

        for (row, track) in tracks.iter().enumerate() {
            let predicted = track.predicted_bbox(frame, self.motion_model);
            for (col, detection) in detections.iter().enumerate() {
                let iou = predicted.iou_with(&detection.bbox);
                // Hard gate: no overlap means a different object, whatever the appearance.
                if iou <= 0.0 || iou < self.min_iou {
                    continue;
                }
                costs[(row, col)] = self.pair_cost(track, detection, iou);
            }
        }

        CostMatrix { costs, track_ids }
    }

    fn pair_cost(&self, track: &Track, detection: &Detection, iou: f64) -> f64 {
        let overlap_cost = 1.0 - iou;
        let (Some(stored), Some(observed)) = (&track.embedding, &detection.embedding) else {
            return overlap_cost;
        };
        if stored.len() != observed.len() {
            return overlap_cost;
        }

        let iou_weight = match track.state {
            TrackState::Inactive => self.inactive_iou_weight,
            _ => self.iou_weight,
        };
        let distance = appearance_distance(self.appearance_metric, stored, observed);
        iou_weight * overlap_cost + self.appearance_weight * distance
    }
}

pub fn appearance_distance(
    metric: AppearanceMetric,
    lhs: &DVector<f64>,
    rhs: &DVector<f64>,
) -> f64 {
    match metric {
        AppearanceMetric::Euclidean => (lhs - rhs).norm(),
        AppearanceMetric::Cosine => {
            let norms = lhs.norm() * rhs.norm();
            if norms == 0.0 {
                return 1.0;
            }
            1.0 - lhs.dot(rhs) / norms
        }
    }
}
