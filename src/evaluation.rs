//! Runs the tracker over benchmark sequences with external detectors,
//! embedders, sequence readers and result writers.

use crate::{
    bbox::BBox,
    config::Config,
    detection::Detection,
    error::{ConfigError, EvaluationError},
    results::ResultSet,
    tracker::Tracker,
};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::{Duration, Instant},
};
use tracing::{info, warn};

/// One frame handed over by a sequence source.
#[derive(Debug, Clone)]
pub struct Frame<P> {
    pub index: u64,
    pub payload: P,
}

/// Yields the frames of one sequence in temporal order.
pub trait SequenceSource {
    type Payload;

    fn next_frame(&mut self) -> Result<Option<Frame<Self::Payload>>, EvaluationError>;
}

/// Opens sequences by name. Every call to `open` starts from the first frame.
pub trait SequenceProvider {
    type Payload;
    type Source: SequenceSource<Payload = Self::Payload>;

    fn open(&mut self, sequence: &str) -> Result<Self::Source, EvaluationError>;
}

pub trait Detector<P> {
    fn detect(&mut self, frame: &Frame<P>) -> Result<Vec<Detection>, EvaluationError>;
}

/// Computes appearance embeddings for detections that arrive without one.
pub trait Embedder<P> {
    fn embed(&mut self, frame: &Frame<P>, bbox: &BBox) -> Result<DVector<f64>, EvaluationError>;
}

pub trait ResultWriter {
    fn write(&mut self, sequence: &str, results: &ResultSet) -> Result<(), EvaluationError>;
}

/// The detector network backing the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    Vgg16,
    Res101,
    /// Detections shipped with the benchmark, read from its files.
    Public,
}

impl FromStr for NetworkKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "vgg16" => Ok(Self::Vgg16),
            "res101" => Ok(Self::Res101),
            "public" => Ok(Self::Public),
            _ => Err(ConfigError::UnknownNetwork(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchmarkFamily {
    Mot17,
    Kitti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Split {
    Train,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KittiClass {
    Pedestrian,
    Car,
}

const MOT17_TRAIN: [u32; 7] = [13, 11, 10, 9, 5, 4, 2];
const MOT17_TEST: [u32; 7] = [1, 3, 6, 7, 8, 12, 14];
const KITTI_TRAIN_COUNT: u32 = 21;
const KITTI_TEST_COUNT: u32 = 29;

/// Which sequences of which benchmark to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BenchmarkSelection {
    pub family: BenchmarkFamily,
    pub splits: Vec<Split>,
    /// Only meaningful for KITTI.
    pub classes: Vec<KittiClass>,
}

impl BenchmarkSelection {
    /// Sequence names in evaluation order.
    pub fn sequences(&self) -> Vec<String> {
        match self.family {
            BenchmarkFamily::Mot17 => self
                .splits
                .iter()
                .flat_map(|split| match split {
                    Split::Train => MOT17_TRAIN.iter(),
                    Split::Test => MOT17_TEST.iter(),
                })
                .map(|number| format!("MOT17-{number:02}"))
                .collect(),
            BenchmarkFamily::Kitti => self
                .classes
                .iter()
                .flat_map(|class| {
                    self.splits.iter().flat_map(move |split| {
                        let (name, count) = match split {
                            Split::Train => ("train", KITTI_TRAIN_COUNT),
                            Split::Test => ("test", KITTI_TEST_COUNT),
                        };
                        (0..count).map(move |number| format!("{name}_{number:04}_{class:?}"))
                    })
                })
                .collect(),
        }
    }
}

impl FromStr for BenchmarkSelection {
    type Err = ConfigError;

    /// Parses selections such as `MOT17-train`, `MOT17-train-test` or
    /// `KITTI-Car-Pedestrian-test`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let unknown = || ConfigError::UnknownBenchmark(text.to_string());
        let mut tokens = text.split(&['-', '_', ' '][..]).filter(|token| !token.is_empty());

        let family = match tokens.next().map(str::to_ascii_lowercase).as_deref() {
            Some("mot17") => BenchmarkFamily::Mot17,
            Some("kitti") => BenchmarkFamily::Kitti,
            _ => return Err(unknown()),
        };

        let mut splits = vec![];
        let mut classes = vec![];
        for token in tokens {
            match token.to_ascii_lowercase().as_str() {
                "train" => splits.push(Split::Train),
                "test" => splits.push(Split::Test),
                "pedestrian" if family == BenchmarkFamily::Kitti => {
                    classes.push(KittiClass::Pedestrian)
                }
                "car" if family == BenchmarkFamily::Kitti => classes.push(KittiClass::Car),
                _ => return Err(unknown()),
            }
        }

        let selection = Self {
            family,
            splits,
            classes,
        };
        if selection.sequences().is_empty() {
            return Err(unknown());
        }
        Ok(selection)
    }
}

impl TryFrom<String> for BenchmarkSelection {
    type Error = ConfigError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<BenchmarkSelection> for String {
    fn from(selection: BenchmarkSelection) -> Self {
        let family = match selection.family {
            BenchmarkFamily::Mot17 => "MOT17",
            BenchmarkFamily::Kitti => "KITTI",
        };
        let classes = selection.classes.iter().map(|class| format!("{class:?}"));
        let splits = selection.splits.iter().map(|split| match split {
            Split::Train => "train".to_string(),
            Split::Test => "test".to_string(),
        });
        std::iter::once(family.to_string())
            .chain(classes)
            .chain(splits)
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// Everything an evaluation run needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Seed for the detector and embedder collaborators. The tracker itself is
    /// deterministic.
    #[serde(default)]
    pub seed: u64,
    pub network: NetworkKind,
    pub benchmark: BenchmarkSelection,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub tracker: Config,
}

impl EvaluationConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.tracker.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Writes the resolved configuration next to the results.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SequenceReport {
    pub sequence: String,
    pub elapsed: Duration,
    /// The number of tracks written, or why the sequence failed.
    pub outcome: Result<usize, EvaluationError>,
}

#[derive(Debug, Default)]
pub struct EvaluationReport {
    pub sequences: Vec<SequenceReport>,
}

impl EvaluationReport {
    /// Time spent in successful and failed sequences alike.
    pub fn total_elapsed(&self) -> Duration {
        self.sequences.iter().map(|report| report.elapsed).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SequenceReport> {
        self.sequences
            .iter()
            .filter(|report| report.outcome.is_err())
    }
}

/// Evaluates sequences one after another with a single, reset-between-runs
/// tracker.
pub struct Evaluator {
    tracker: Tracker,
    interpolate: bool,
}

impl Evaluator {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            tracker: Tracker::new(config)?,
            interpolate: config.interpolate,
        })
    }

    pub fn run<P: SequenceProvider>(
        &mut self,
        sequences: &[String],
        provider: &mut P,
        detector: &mut dyn Detector<P::Payload>,
        mut embedder: Option<&mut dyn Embedder<P::Payload>>,
        writer: &mut dyn ResultWriter,
    ) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        for sequence in sequences {
            info!(%sequence, "evaluating");
            let now = Instant::now();
            let outcome = self.evaluate_sequence(
                sequence,
                provider,
                detector,
                embedder.as_deref_mut(),
                writer,
            );
            let elapsed = now.elapsed();

            match &outcome {
                Ok(track_count) => info!(
                    %sequence,
                    tracks = track_count,
                    elapsed_sec = elapsed.as_secs_f64(),
                    "sequence finished"
                ),
                Err(err) => warn!(%sequence, error = %err, "sequence failed"),
            }
            report.sequences.push(SequenceReport {
                sequence: sequence.clone(),
                elapsed,
                outcome,
            });
        }
        info!(
            elapsed_sec = report.total_elapsed().as_secs_f64(),
            "evaluation finished"
        );
        report
    }

    fn evaluate_sequence<'e, P: SequenceProvider>(
        &mut self,
        sequence: &str,
        provider: &mut P,
        detector: &mut dyn Detector<P::Payload>,
        mut embedder: Option<&mut (dyn Embedder<P::Payload> + 'e)>,
        writer: &mut dyn ResultWriter,
    ) -> Result<usize, EvaluationError> {
        self.tracker.reset();
        let mut source = provider.open(sequence)?;

        while let Some(frame) = source.next_frame()? {
            let mut detections = detector.detect(&frame)?;
            if let Some(embedder) = embedder.as_deref_mut() {
                for detection in detections.iter_mut().filter(|det| det.embedding.is_none()) {
                    detection.embedding = Some(embedder.embed(&frame, &detection.bbox)?);
                }
            }
            self.tracker.step(frame.index, detections)?;
        }

        let mut results = self.tracker.finish();
        if self.interpolate {
            results = results.interpolated();
        }
        writer.write(sequence, &results)?;
        Ok(results.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackId;
    use std::collections::HashMap;

    #[test]
    fn network_names() {
        assert_eq!("VGG16".parse::<NetworkKind>().unwrap(), NetworkKind::Vgg16);
        assert_eq!("res101".parse::<NetworkKind>().unwrap(), NetworkKind::Res101);
        assert!(matches!(
            "res50".parse::<NetworkKind>(),
            Err(ConfigError::UnknownNetwork(_))
        ));
    }

    #[test]
    fn mot17_train_sequences() {
        let selection: BenchmarkSelection = "MOT17-train".parse().unwrap();
        let sequences = selection.sequences();
        assert_eq!(sequences.len(), 7);
        assert_eq!(sequences[0], "MOT17-13");
        assert_eq!(sequences[6], "MOT17-02");
    }

    #[test]
    fn kitti_selection() {
        let selection: BenchmarkSelection = "KITTI-Pedestrian-Car-train".parse().unwrap();
        let sequences = selection.sequences();
        assert_eq!(sequences.len(), 42);
        assert_eq!(sequences[0], "train_0000_Pedestrian");
        assert_eq!(sequences[21], "train_0000_Car");
    }

    #[test]
    fn unknown_benchmarks_are_config_errors() {
        for text in ["MOT16-train", "MOT17-val", "MOT17", "KITTI-train", "MOT17-Car-train"] {
            assert!(
                matches!(
                    text.parse::<BenchmarkSelection>(),
                    Err(ConfigError::UnknownBenchmark(_))
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn evaluation_config_from_json() {
        let config = EvaluationConfig::from_json_str(
            r#"{
                "network": "public",
                "benchmark": "MOT17-test",
                "output_dir": "out",
                "tracker": { "inactive_patience": 20 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.network, NetworkKind::Public);
        assert_eq!(config.benchmark.sequences().len(), 7);
        assert_eq!(config.tracker.inactive_patience, 20);
        assert_eq!(config.seed, 0);
    }

    #[test]
    fn evaluation_config_rejects_unknown_network() {
        let err = EvaluationConfig::from_json_str(
            r#"{ "network": "alexnet", "benchmark": "MOT17-test", "output_dir": "out" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    struct VecSource(std::vec::IntoIter<Frame<Vec<Detection>>>);

    impl SequenceSource for VecSource {
        type Payload = Vec<Detection>;

        fn next_frame(&mut self) -> Result<Option<Frame<Self::Payload>>, EvaluationError> {
            Ok(self.0.next())
        }
    }

    struct MapProvider(HashMap<String, Vec<Frame<Vec<Detection>>>>);

    impl SequenceProvider for MapProvider {
        type Payload = Vec<Detection>;
        type Source = VecSource;

        fn open(&mut self, sequence: &str) -> Result<VecSource, EvaluationError> {
            let frames = self.0.get(sequence).ok_or_else(|| EvaluationError::Source {
                sequence: sequence.to_string(),
                message: "missing".to_string(),
            })?;
            Ok(VecSource(frames.clone().into_iter()))
        }
    }

    struct Passthrough;

    impl Detector<Vec<Detection>> for Passthrough {
        fn detect(
            &mut self,
            frame: &Frame<Vec<Detection>>,
        ) -> Result<Vec<Detection>, EvaluationError> {
            Ok(frame.payload.clone())
        }
    }

    struct ConstantEmbedder;

    impl Embedder<Vec<Detection>> for ConstantEmbedder {
        fn embed(
            &mut self,
            _frame: &Frame<Vec<Detection>>,
            _bbox: &BBox,
        ) -> Result<DVector<f64>, EvaluationError> {
            Ok(DVector::from_element(2, 1.0))
        }
    }

    #[derive(Default)]
    struct MemoryWriter(HashMap<String, ResultSet>);

    impl ResultWriter for MemoryWriter {
        fn write(&mut self, sequence: &str, results: &ResultSet) -> Result<(), EvaluationError> {
            self.0.insert(sequence.to_string(), results.clone());
            Ok(())
        }
    }

    fn frames(count: u64) -> Vec<Frame<Vec<Detection>>> {
        (1..=count)
            .map(|index| Frame {
                index,
                payload: vec![Detection::new(BBox::new(0.0, 0.0, 10.0, 10.0), 0.9)],
            })
            .collect()
    }

    #[test]
    fn failed_sequence_does_not_affect_others() {
        let mut provider = MapProvider(HashMap::from([
            ("a".to_string(), frames(3)),
            ("c".to_string(), frames(5)),
        ]));
        let mut evaluator = Evaluator::new(&Config::default()).unwrap();
        let mut writer = MemoryWriter::default();
        let sequences = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let report = evaluator.run(
            &sequences,
            &mut provider,
            &mut Passthrough,
            Some(&mut ConstantEmbedder),
            &mut writer,
        );

        assert_eq!(report.sequences.len(), 3);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.sequences[1].sequence, "b");
        assert!(!writer.0.contains_key("b"));

        // Identifiers restart for every sequence
        for name in ["a", "c"] {
            let results = &writer.0[name];
            assert_eq!(results.len(), 1);
            assert!(results.get(TrackId(1)).is_some());
        }
        assert_eq!(writer.0["c"].get(TrackId(1)).unwrap().len(), 5);
    }
}
