use std::io;
use thiserror::Error;

/// Raised before any sequence is processed when the configuration cannot be
/// used as given.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("unknown detector network: {0}")]
    UnknownNetwork(String),

    #[error("unknown benchmark selection: {0}")]
    UnknownBenchmark(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
}

impl ConfigError {
    pub(crate) fn invalid<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised by the per-frame tracking step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    #[error("frame {current} does not come after frame {previous}")]
    FrameOrder { previous: u64, current: u64 },
}

/// Why a detection was rejected at the frame boundary. These never abort a
/// frame; the detection is dropped and the rest of the frame is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionIssue {
    #[error("bounding box has non-finite coordinates")]
    NonFiniteBox,

    #[error("bounding box has no area ({width} x {height})")]
    EmptyBox { width: f64, height: f64 },

    #[error("score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    EmbeddingDimension { expected: usize, actual: usize },

    #[error("embedding has non-finite values")]
    NonFiniteEmbedding,
}

/// A failure that aborts the evaluation of one sequence.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("sequence `{sequence}` could not be read: {message}")]
    Source { sequence: String, message: String },

    #[error("malformed detection row at line {line}: {message}")]
    MalformedRow { line: usize, message: String },

    #[error("detector failed: {0}")]
    Detector(String),

    #[error("embedder failed: {0}")]
    Embedder(String),

    #[error("failed to write results for `{sequence}`: {source}")]
    Writer {
        sequence: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
