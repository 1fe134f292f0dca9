//! MOT Challenge text files: public detections in, trajectories out.

use crate::{
    bbox::BBox,
    detection::Detection,
    error::EvaluationError,
    evaluation::{Detector, Frame, ResultWriter, SequenceProvider, SequenceSource},
    results::ResultSet,
};
use itertools::Itertools;
use std::{
    collections::{btree_map, BTreeMap},
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::PathBuf,
};
use tracing::debug;

/// Parses `frame, id, x, y, w, h, score, ...` rows into a sequence of
/// detection frames. Every index from the first to the last frame is
/// replayed, so frames without rows come out empty.
pub fn parse_detections<R: BufRead>(reader: R) -> Result<MotSequence, EvaluationError> {
    let mut by_frame: BTreeMap<u64, Vec<Detection>> = BTreeMap::new();
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (frame, detection) = parse_row(line, line_idx + 1)?;
        by_frame.entry(frame).or_default().push(detection);
    }
    Ok(MotSequence::new(by_frame))
}

fn parse_row(line: &str, line_no: usize) -> Result<(u64, Detection), EvaluationError> {
    let malformed = |message: String| EvaluationError::MalformedRow {
        line: line_no,
        message,
    };
    let fields = line.split(',').map(str::trim).collect_vec();
    if fields.len() < 7 {
        return Err(malformed(format!(
            "expected at least 7 fields, got {}",
            fields.len()
        )));
    }

    let frame = fields[0]
        .parse::<f64>()
        .ok()
        .filter(|frame| frame.fract() == 0.0 && *frame >= 0.0)
        .ok_or_else(|| malformed(format!("invalid frame index `{}`", fields[0])))?
        as u64;
    let numbers: Vec<f64> = fields[2..7]
        .iter()
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|_| malformed(format!("invalid number `{field}`")))
        })
        .collect::<Result<_, _>>()?;
    let [x, y, w, h, score] = [numbers[0], numbers[1], numbers[2], numbers[3], numbers[4]];

    Ok((frame, Detection::new(BBox::from_xywh(x, y, w, h), score)))
}

/// Replays detections read ahead of time, one frame per index. Frames
/// between two rows are produced on demand.
#[derive(Debug)]
pub struct MotSequence {
    rows: btree_map::IntoIter<u64, Vec<Detection>>,
    pending: Option<(u64, Vec<Detection>)>,
    next_index: u64,
}

impl MotSequence {
    pub fn new(by_frame: BTreeMap<u64, Vec<Detection>>) -> Self {
        let mut rows = by_frame.into_iter();
        let pending = rows.next();
        let next_index = pending.as_ref().map_or(0, |(frame, _)| *frame);
        Self {
            rows,
            pending,
            next_index,
        }
    }

    /// Number of frames that carry at least one row and are not yet replayed.
    pub fn remaining_detection_frames(&self) -> usize {
        self.rows.len() + usize::from(self.pending.is_some())
    }
}

impl SequenceSource for MotSequence {
    type Payload = Vec<Detection>;

    fn next_frame(&mut self) -> Result<Option<Frame<Self::Payload>>, EvaluationError> {
        let Some((row_frame, payload)) = self.pending.take() else {
            return Ok(None);
        };
        let index = self.next_index;
        let payload = if row_frame == index {
            self.pending = self.rows.next();
            payload
        } else {
            self.pending = Some((row_frame, payload));
            vec![]
        };
        self.next_index = index.saturating_add(1);
        Ok(Some(Frame { index, payload }))
    }
}

/// Opens `<root>/<sequence>/det/det.txt`.
pub struct MotDirectoryProvider {
    root: PathBuf,
}

impl MotDirectoryProvider {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

impl SequenceProvider for MotDirectoryProvider {
    type Payload = Vec<Detection>;
    type Source = MotSequence;

    fn open(&mut self, sequence: &str) -> Result<MotSequence, EvaluationError> {
        let path = self.root.join(sequence).join("det").join("det.txt");
        let file = File::open(&path).map_err(|err| EvaluationError::Source {
            sequence: sequence.to_string(),
            message: format!("{}: {err}", path.display()),
        })?;
        let frames = parse_detections(BufReader::new(file))?;
        debug!(
            sequence,
            frames = frames.remaining_detection_frames(),
            "loaded public detections"
        );
        Ok(frames)
    }
}

/// Forwards the public detections carried by each frame.
pub struct PublicDetections;

impl Detector<Vec<Detection>> for PublicDetections {
    fn detect(
        &mut self,
        frame: &Frame<Vec<Detection>>,
    ) -> Result<Vec<Detection>, EvaluationError> {
        Ok(frame.payload.clone())
    }
}

/// Writes `frame,id,x,y,w,h,score,-1,-1,-1` rows, ordered by frame and then
/// by track identifier.
pub fn write_results<W: Write>(mut writer: W, results: &ResultSet) -> std::io::Result<()> {
    for (track_id, obs) in results.rows() {
        let [x, y, w, h] = obs.bbox.to_xywh();
        writeln!(
            writer,
            "{},{},{:.2},{:.2},{:.2},{:.2},{:.4},-1,-1,-1",
            obs.frame, track_id, x, y, w, h, obs.score
        )?;
    }
    writer.flush()
}

/// Writes one `<sequence>.txt` per sequence into a directory.
pub struct MotResultWriter {
    output_dir: PathBuf,
}

impl MotResultWriter {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl ResultWriter for MotResultWriter {
    fn write(&mut self, sequence: &str, results: &ResultSet) -> Result<(), EvaluationError> {
        let to_error = |source| EvaluationError::Writer {
            sequence: sequence.to_string(),
            source,
        };
        fs::create_dir_all(&self.output_dir).map_err(to_error)?;
        let path = self.output_dir.join(format!("{sequence}.txt"));
        let file = File::create(&path).map_err(to_error)?;
        write_results(BufWriter::new(file), results).map_err(to_error)
    }
}
