use crate::{
    association::Matching,
    config::Config,
    detection::Detection,
    track::{MissOutcome, Track, TrackId, TrackState},
};
use itertools::Itertools;
use std::ops::RangeFrom;
use tracing::debug;

/// Counts of the state changes applied on one frame.
#[derive(Debug, Clone, Default)]
pub struct LifecycleOutcome {
    pub matched: usize,
    pub reactivated: usize,
    pub created: usize,
    pub deactivated: usize,
    /// Tracks that were killed this frame, already removed from the working set.
    pub killed: Vec<Track>,
}

/// Owns the working set of Active and Inactive tracks and applies the
/// per-frame state transitions.
pub struct LifecycleManager {
    active_patience: u32,
    inactive_patience: u32,
    new_track_threshold: f64,
    embedding_update_rate: f64,
    tracks: Vec<Track>,
    unique_id_iter: RangeFrom<u64>,
}

impl LifecycleManager {
    pub fn new(config: &Config) -> Self {
        let Config {
            active_patience,
            inactive_patience,
            new_track_threshold,
            embedding_update_rate,
            ..
        } = *config;

        Self {
            active_patience,
            inactive_patience,
            new_track_threshold,
            embedding_update_rate,
            tracks: vec![],
            unique_id_iter: 1..,
        }
    }

    /// The working set, ordered by ascending identifier.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Drops every track and restarts identifiers at 1.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.unique_id_iter = 1..;
    }

    /// Removes and returns every remaining track.
    pub fn drain(&mut self) -> Vec<Track> {
        std::mem::take(&mut self.tracks)
    }

    pub fn apply(
        &mut self,
        frame: u64,
        detections: Vec<Detection>,
        matching: &Matching,
    ) -> LifecycleOutcome {
        let mut outcome = LifecycleOutcome::default();
        let mut detections: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();

        // Matched pairs
        let embedding_update_rate = self.embedding_update_rate;
        for &(track_id, det_idx) in &matching.matches {
            let (Some(track), Some(detection)) =
                (self.track_mut(track_id), detections[det_idx].take())
            else {
                continue;
            };
            if !track.is_active() {
                debug!(track = %track_id, frame, "track reactivated");
                outcome.reactivated += 1;
            }
            track.mark_matched(frame, detection, embedding_update_rate);
            outcome.matched += 1;
        }

        // Unmatched tracks
        for &track_id in &matching.unmatched_tracks {
            let (active_patience, inactive_patience) =
                (self.active_patience, self.inactive_patience);
            let Some(track) = self.track_mut(track_id) else {
                continue;
            };
            match track.mark_missed(active_patience, inactive_patience) {
                MissOutcome::Deactivated => outcome.deactivated += 1,
                MissOutcome::Killed => debug!(track = %track_id, frame, "track killed"),
                MissOutcome::Unchanged => {}
            }
        }
        let (killed, alive): (Vec<Track>, Vec<Track>) = std::mem::take(&mut self.tracks)
            .into_iter()
            .partition(|track| track.state == TrackState::Killed);
        self.tracks = alive;
        outcome.killed = killed;

        // Unmatched detections start new tracks when confident enough
        let new_tracks = matching
            .unmatched_detections
            .iter()
            .filter_map(|&det_idx| detections[det_idx].take())
            .filter(|detection| detection.score >= self.new_track_threshold)
            .collect_vec();
        for detection in new_tracks {
            let Some(id) = self.unique_id_iter.next() else {
                break;
            };
            self.tracks.push(Track::new(TrackId(id), frame, detection));
            outcome.created += 1;
        }

        outcome
    }

    fn track_mut(&mut self, track_id: TrackId) -> Option<&mut Track> {
        let index = self
            .tracks
            .binary_search_by_key(&track_id, Track::id)
            .ok()?;
        self.tracks.get_mut(index)
    }
}
