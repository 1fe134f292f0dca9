use crate::{
    association::AssociationEngine,
    config::Config,
    detection::Detection,
    error::{ConfigError, TrackingError},
    lifecycle::{LifecycleManager, LifecycleOutcome},
    results::{ResultCollector, ResultSet},
    track::Track,
};
use tracing::{debug, warn};

/// What one call to [`Tracker::step`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub frame: u64,
    pub matched: usize,
    pub reactivated: usize,
    pub created: usize,
    pub deactivated: usize,
    pub killed: usize,
    /// Detections rejected at the frame boundary.
    pub dropped: usize,
}

/// This is the main struct to perform object tracking on one sequence at a
/// time.
pub struct Tracker {
    association: AssociationEngine,
    lifecycle: LifecycleManager,
    collector: ResultCollector,
    configured_embedding_dim: Option<usize>,
    embedding_dim: Option<usize>,
    last_frame: Option<u64>,
}

impl Tracker {
    /// This is the function to build a Tracker.
    ///
    /// Example:
    ///
    /// ```rust
    /// use mot_tracking::config::Config;
    /// use mot_tracking::Tracker;
    ///
    /// let config = Config {
    ///     active_patience: 0,
    ///     inactive_patience: 30,
    ///     new_track_threshold: 0.6,
    ///     ..Config::default()
    /// };
    /// let tracker = Tracker::new(&config).unwrap();
    /// ```
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            association: AssociationEngine::new(config),
            lifecycle: LifecycleManager::new(config),
            collector: ResultCollector::new(),
            configured_embedding_dim: config.embedding_dim,
            embedding_dim: config.embedding_dim,
            last_frame: None,
        })
    }

    /// Forgets every track and result so the next frame starts a new sequence.
    pub fn reset(&mut self) {
        self.lifecycle.reset();
        self.collector.reset();
        self.embedding_dim = self.configured_embedding_dim;
        self.last_frame = None;
    }

    /// Active and Inactive tracks, ordered by identifier.
    pub fn tracks(&self) -> &[Track] {
        self.lifecycle.tracks()
    }

    /// This is the function to track objects in one frame.
    ///
    /// Example:
    ///
    /// ```rust
    /// # use mot_tracking::config::Config;
    /// # use mot_tracking::Tracker;
    /// use mot_tracking::bbox::BBox;
    /// use mot_tracking::detection::Detection;
    /// # let mut tracker = Tracker::new(&Config::default()).unwrap();
    /// let detections = vec![
    ///     Detection::new(BBox::new(10.0, 10.0, 50.0, 120.0), 0.9),
    ///     Detection::new(BBox::new(200.0, 40.0, 240.0, 150.0), 0.8),
    /// ];
    /// let summary = tracker.step(1, detections).unwrap();
    /// assert_eq!(summary.created, 2);
    /// ```
    pub fn step(
        &mut self,
        frame: u64,
        detections: Vec<Detection>,
    ) -> Result<FrameSummary, TrackingError> {
        if let Some(previous) = self.last_frame {
            if frame <= previous {
                return Err(TrackingError::FrameOrder {
                    previous,
                    current: frame,
                });
            }
        }
        self.last_frame = Some(frame);

        let total = detections.len();
        let detections = self.accept_detections(frame, detections);
        let dropped = total - detections.len();

        let matching = self
            .association
            .associate(self.lifecycle.tracks(), &detections, frame);
        let LifecycleOutcome {
            matched,
            reactivated,
            created,
            deactivated,
            killed,
        } = self.lifecycle.apply(frame, detections, &matching);

        let summary = FrameSummary {
            frame,
            matched,
            reactivated,
            created,
            deactivated,
            killed: killed.len(),
            dropped,
        };
        for track in killed {
            self.collector.absorb(track);
        }

        debug!(
            frame,
            matched,
            created,
            reactivated,
            deactivated,
            killed = summary.killed,
            dropped,
            tracks = self.lifecycle.tracks().len(),
            "frame tracked"
        );
        Ok(summary)
    }

    /// The trajectories collected so far, including tracks still being
    /// followed. Not interpolated.
    pub fn results(&self) -> ResultSet {
        self.collector.snapshot(self.lifecycle.tracks())
    }

    /// Ends the sequence: every remaining track is handed to the collector
    /// and the full result set is returned.
    pub fn finish(&mut self) -> ResultSet {
        for track in self.lifecycle.drain() {
            self.collector.absorb(track);
        }
        self.collector.snapshot(&[])
    }

    fn accept_detections(&mut self, frame: u64, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .enumerate()
            .filter_map(|(index, detection)| {
                if let Err(issue) = detection.validate(self.embedding_dim) {
                    warn!(frame, index, %issue, "dropping detection");
                    return None;
                }
                if let (None, Some(embedding)) = (self.embedding_dim, &detection.embedding) {
                    self.embedding_dim = Some(embedding.len());
                }
                Some(detection)
            })
            .collect()
    }
}
