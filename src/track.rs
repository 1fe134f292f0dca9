use crate::{bbox::BBox, config::MotionModel, detection::Detection};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The identifier of a track. Assigned once, in increasing order, and never
/// reused within a sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Active,
    Inactive,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationKind {
    Detected,
    Interpolated,
}

/// One position of a track in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub frame: u64,
    pub bbox: BBox,
    pub score: f64,
    pub kind: ObservationKind,
}

impl Observation {
    pub fn detected(frame: u64, bbox: BBox, score: f64) -> Self {
        Self {
            frame,
            bbox,
            score,
            kind: ObservationKind::Detected,
        }
    }
}

/// What happened to a track on a frame where it found no detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissOutcome {
    Unchanged,
    Deactivated,
    Killed,
}

#[derive(Clone, Debug)]
pub struct Track {
    id: TrackId,
    pub bbox: BBox,
    pub embedding: Option<DVector<f64>>,
    pub state: TrackState,
    pub frames_since_last_match: u32,
    pub history: Vec<Observation>,
}

impl Track {
    pub fn new(id: TrackId, frame: u64, detection: Detection) -> Self {
        let Detection {
            bbox,
            score,
            embedding,
        } = detection;
        Self {
            id,
            bbox,
            embedding,
            state: TrackState::Active,
            frames_since_last_match: 0,
            history: vec![Observation::detected(frame, bbox, score)],
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.state == TrackState::Active
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.history.last().map(|obs| obs.frame)
    }

    /// The box this track is expected to occupy at `frame`.
    pub fn predicted_bbox(&self, frame: u64, motion_model: MotionModel) -> BBox {
        let MotionModel::ConstantVelocity = motion_model else {
            return self.bbox;
        };
        let [.., prev, last] = self.history.as_slice() else {
            return self.bbox;
        };
        let span = (last.frame - prev.frame) as f64;
        let ahead = frame.saturating_sub(last.frame) as f64;
        // Extrapolating the segment prev -> last by `ahead / span` of its length.
        prev.bbox.lerp(&last.bbox, 1.0 + ahead / span)
    }

    /// Applies an accepted match: the box and embedding follow the detection,
    /// the miss counter resets and the track becomes Active again.
    pub fn mark_matched(&mut self, frame: u64, detection: Detection, embedding_update_rate: f64) {
        let Detection {
            bbox,
            score,
            embedding,
        } = detection;

        self.bbox = bbox;
        if let Some(new_embedding) = embedding {
            self.update_embedding(new_embedding, embedding_update_rate);
        }
        self.frames_since_last_match = 0;
        self.state = TrackState::Active;
        self.history.push(Observation::detected(frame, bbox, score));
    }

    fn update_embedding(&mut self, new_embedding: DVector<f64>, rate: f64) {
        self.embedding = match self.embedding.take() {
            Some(old) if rate < 1.0 && old.len() == new_embedding.len() => {
                Some(old * (1.0 - rate) + new_embedding * rate)
            }
            _ => Some(new_embedding),
        };
    }

    /// Advances the miss counter and applies the patience rules.
    pub fn mark_missed(&mut self, active_patience: u32, inactive_patience: u32) -> MissOutcome {
        self.frames_since_last_match += 1;
        match self.state {
            TrackState::Active if self.frames_since_last_match > active_patience => {
                self.state = TrackState::Inactive;
                MissOutcome::Deactivated
            }
            TrackState::Inactive if self.frames_since_last_match > inactive_patience => {
                self.state = TrackState::Killed;
                MissOutcome::Killed
            }
            _ => MissOutcome::Unchanged,
        }
    }
}
