use crate::{
    interpolate::fill_gaps,
    track::{Observation, Track, TrackId},
};
use std::collections::BTreeMap;

/// The trajectories of one evaluated sequence, keyed by track identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    tracks: BTreeMap<TrackId, Vec<Observation>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, track_id: TrackId) -> Option<&[Observation]> {
        self.tracks.get(&track_id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrackId, &[Observation])> + '_ {
        self.tracks
            .iter()
            .map(|(&track_id, history)| (track_id, history.as_slice()))
    }

    /// A copy with every trajectory gap-filled.
    pub fn interpolated(&self) -> Self {
        let tracks = self
            .tracks
            .iter()
            .map(|(&track_id, history)| (track_id, fill_gaps(history)))
            .collect();
        Self { tracks }
    }

    /// Every observation as `(track, observation)`, ordered by frame and then
    /// by track identifier.
    pub fn rows(&self) -> Vec<(TrackId, &Observation)> {
        let mut rows: Vec<_> = self
            .tracks
            .iter()
            .flat_map(|(&track_id, history)| history.iter().map(move |obs| (track_id, obs)))
            .collect();
        rows.sort_by_key(|&(track_id, obs)| (obs.frame, track_id));
        rows
    }
}

/// Accumulates the histories of tracks as they leave the working set.
#[derive(Debug, Default)]
pub struct ResultCollector {
    finished: BTreeMap<TrackId, Vec<Observation>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.finished.clear();
    }

    /// Takes over the history of a track that is no longer tracked.
    pub fn absorb(&mut self, track: Track) {
        let track_id = track.id();
        let history = track.history;
        if history.is_empty() {
            return;
        }
        let previous = self.finished.insert(track_id, history);
        debug_assert!(previous.is_none(), "track {track_id} collected twice");
    }

    /// The finished histories plus those of the tracks still being followed.
    pub fn snapshot(&self, live_tracks: &[Track]) -> ResultSet {
        let mut tracks = self.finished.clone();
        tracks.extend(
            live_tracks
                .iter()
                .filter(|track| !track.history.is_empty())
                .map(|track| (track.id(), track.history.clone())),
        );
        ResultSet { tracks }
    }
}
