//! End-to-end behaviour of the tracker over short synthetic sequences.

use approx::assert_relative_eq;
use mot_tracking::{
    bbox::BBox,
    config::{AppearanceMetric, Config, MotionModel},
    detection::Detection,
    track::{ObservationKind, TrackId, TrackState},
    Tracker,
};
use nalgebra::DVector;
use std::collections::HashSet;

fn det(x: f64, y: f64, score: f64) -> Detection {
    Detection::new(BBox::new(x, y, x + 40.0, y + 100.0), score)
}

#[test]
fn reactivated_track_is_interpolated_through_the_gap() {
    let config = Config {
        active_patience: 0,
        inactive_patience: 10,
        motion_model: MotionModel::Static,
        ..Config::default()
    };
    let mut tracker = Tracker::new(&config).unwrap();

    for frame in 1..=5 {
        let x = 100.0 + frame as f64;
        tracker.step(frame, vec![det(x, 50.0, 0.9)]).unwrap();
    }
    for frame in 6..=8 {
        let summary = tracker.step(frame, vec![]).unwrap();
        assert_eq!(summary.killed, 0);
    }
    assert_eq!(tracker.tracks()[0].state, TrackState::Inactive);

    let summary = tracker.step(9, vec![det(113.0, 50.0, 0.9)]).unwrap();
    assert_eq!(summary.reactivated, 1);
    assert_eq!(summary.created, 0);

    let results = tracker.finish();
    assert_eq!(results.len(), 1);
    let raw: Vec<u64> = results
        .get(TrackId(1))
        .unwrap()
        .iter()
        .map(|obs| obs.frame)
        .collect();
    assert_eq!(raw, vec![1, 2, 3, 4, 5, 9]);

    let filled = results.interpolated();
    let history = filled.get(TrackId(1)).unwrap();
    let frames: Vec<u64> = history.iter().map(|obs| obs.frame).collect();
    assert_eq!(frames, (1..=9).collect::<Vec<_>>());

    // Frame 5 is at x = 105, frame 9 at x = 113: 2 px per frame in between
    for obs in &history[5..8] {
        assert_eq!(obs.kind, ObservationKind::Interpolated);
        let expected = 105.0 + (obs.frame - 5) as f64 * 2.0;
        assert_relative_eq!(obs.bbox.x1, expected);
        assert_relative_eq!(obs.bbox.x2, expected + 40.0);
        assert_relative_eq!(obs.bbox.y1, 50.0);
    }
}

#[test]
fn identifiers_are_unique_even_after_kill() {
    let config = Config {
        active_patience: 0,
        inactive_patience: 1,
        ..Config::default()
    };
    let mut tracker = Tracker::new(&config).unwrap();

    tracker.step(1, vec![det(0.0, 0.0, 0.9)]).unwrap();
    tracker.step(2, vec![]).unwrap();
    let summary = tracker.step(3, vec![]).unwrap();
    assert_eq!(summary.killed, 1);

    // Same place, new object
    let summary = tracker.step(4, vec![det(0.0, 0.0, 0.9)]).unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(tracker.tracks()[0].id(), TrackId(2));

    let results = tracker.finish();
    let ids: Vec<TrackId> = results.iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![TrackId(1), TrackId(2)]);
}

#[test]
fn histories_strictly_increase() {
    let mut tracker = Tracker::new(&Config::default()).unwrap();
    for frame in 1..=30 {
        let mut detections = vec![det(frame as f64 * 3.0, 0.0, 0.9)];
        if frame % 4 != 0 {
            detections.push(det(500.0 - frame as f64 * 3.0, 300.0, 0.8));
        }
        if frame % 7 == 0 {
            detections.push(det(900.0, 900.0, 0.95));
        }
        tracker.step(frame, detections).unwrap();
    }
    let results = tracker.finish();
    assert!(!results.is_empty());

    let mut seen = HashSet::new();
    for (id, history) in results.iter() {
        assert!(seen.insert(id));
        assert!(history.windows(2).all(|pair| pair[0].frame < pair[1].frame));
    }
}

#[test]
fn low_confidence_frame_starts_no_tracks() {
    let config = Config {
        new_track_threshold: 0.6,
        ..Config::default()
    };
    let mut tracker = Tracker::new(&config).unwrap();
    let detections = (0..20)
        .map(|i| det(i as f64 * 50.0, 0.0, 0.59))
        .collect();
    let summary = tracker.step(1, detections).unwrap();
    assert_eq!(summary.created, 0);
    assert!(tracker.tracks().is_empty());
    assert!(tracker.finish().is_empty());
}

#[test]
fn zero_active_patience_deactivates_on_first_miss() {
    let config = Config {
        active_patience: 0,
        ..Config::default()
    };
    let mut tracker = Tracker::new(&config).unwrap();
    tracker.step(1, vec![det(0.0, 0.0, 0.9)]).unwrap();
    let summary = tracker.step(2, vec![]).unwrap();
    assert_eq!(summary.deactivated, 1);
    assert_eq!(tracker.tracks()[0].state, TrackState::Inactive);
    assert_eq!(tracker.tracks()[0].frames_since_last_match, 1);
}

#[test]
fn appearance_resolves_crossing_objects() {
    let config = Config {
        iou_weight: 0.3,
        appearance_weight: 0.7,
        min_iou: 0.05,
        motion_model: MotionModel::Static,
        ..Config::default()
    };
    let mut tracker = Tracker::new(&config).unwrap();
    let red = DVector::from_vec(vec![1.0, 0.0, 0.0]);
    let blue = DVector::from_vec(vec![0.0, 1.0, 0.0]);

    tracker
        .step(
            1,
            vec![
                det(100.0, 0.0, 0.9).with_embedding(red.clone()),
                det(120.0, 0.0, 0.9).with_embedding(blue.clone()),
            ],
        )
        .unwrap();
    // Overlap alone would swap the identities: each box now sits closer to the
    // other track's last position.
    let summary = tracker
        .step(
            2,
            vec![
                det(118.0, 0.0, 0.9).with_embedding(red.clone()),
                det(102.0, 0.0, 0.9).with_embedding(blue.clone()),
            ],
        )
        .unwrap();
    assert_eq!(summary.matched, 2);

    let tracks = tracker.tracks();
    assert_eq!(tracks[0].id(), TrackId(1));
    assert_eq!(tracks[0].embedding.as_ref(), Some(&red));
    assert_relative_eq!(tracks[0].bbox.x1, 118.0);
    assert_eq!(tracks[1].embedding.as_ref(), Some(&blue));
    assert_relative_eq!(tracks[1].bbox.x1, 102.0);
}

#[test]
fn far_euclidean_embedding_starts_a_new_track() {
    let config = Config {
        appearance_metric: AppearanceMetric::Euclidean,
        ..Config::default()
    };
    let mut tracker = Tracker::new(&config).unwrap();
    tracker
        .step(1, vec![det(0.0, 0.0, 0.9).with_embedding(DVector::from_vec(vec![0.0]))])
        .unwrap();

    // Same box, embedding 1e13 away
    let summary = tracker
        .step(2, vec![det(0.0, 0.0, 0.9).with_embedding(DVector::from_vec(vec![1e13]))])
        .unwrap();
    assert_eq!(summary.matched, 0);
    assert_eq!(summary.created, 1);
    let ids: Vec<TrackId> = tracker.tracks().iter().map(|track| track.id()).collect();
    assert_eq!(ids, vec![TrackId(1), TrackId(2)]);
}

#[test]
fn reset_isolates_sequences() {
    let mut tracker = Tracker::new(&Config::default()).unwrap();
    tracker.step(10, vec![det(0.0, 0.0, 0.9), det(300.0, 0.0, 0.9)]).unwrap();
    tracker.reset();

    // Frame numbering restarts as well
    tracker.step(1, vec![det(0.0, 0.0, 0.9)]).unwrap();
    let results = tracker.finish();
    assert_eq!(results.len(), 1);
    assert!(results.get(TrackId(1)).is_some());
    assert!(results.get(TrackId(2)).is_none());
}
