//! Optimal track-to-detection assignment.

use crate::{
    config::Config,
    cost_matrix::{CostMatrix, CostMatrixBuilder},
    detection::Detection,
    track::{Track, TrackId},
};
use nalgebra::DMatrix;
use noisy_float::prelude::r64;
use pathfinding::{kuhn_munkres::kuhn_munkres_min, matrix::Matrix};

/// Costs are compared after rounding to this many steps per unit, so values
/// closer than that count as equal and fall to the identifier tie-break.
const COST_STEPS_PER_UNIT: f64 = 1_000_000.0;

/// The association result for one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matching {
    /// Accepted pairs of track and detection index.
    pub matches: Vec<(TrackId, usize)>,
    pub unmatched_tracks: Vec<TrackId>,
    pub unmatched_detections: Vec<usize>,
}

/// Row/column level result of [`solve_assignment`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub pairs: Vec<(usize, usize)>,
    pub unassigned_rows: Vec<usize>,
    pub unassigned_cols: Vec<usize>,
}

pub struct AssociationEngine {
    cost_builder: CostMatrixBuilder,
    acceptance_threshold: f64,
}

impl AssociationEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            cost_builder: CostMatrixBuilder::new(config),
            acceptance_threshold: config.acceptance_threshold,
        }
    }

    /// Matches the given Active and Inactive tracks against this frame's
    /// detections. `tracks` must be ordered by ascending identifier.
    pub fn associate(&self, tracks: &[Track], detections: &[Detection], frame: u64) -> Matching {
        let CostMatrix { costs, track_ids } = self.cost_builder.build(tracks, detections, frame);
        let Assignment {
            pairs,
            unassigned_rows,
            unassigned_cols,
        } = solve_assignment(&costs, self.acceptance_threshold);

        Matching {
            matches: pairs
                .into_iter()
                .map(|(row, col)| (track_ids[row], col))
                .collect(),
            unmatched_tracks: unassigned_rows.into_iter().map(|row| track_ids[row]).collect(),
            unmatched_detections: unassigned_cols,
        }
    }
}

/// Minimum-cost bipartite assignment over the finite entries of `costs`.
///
/// Pairs whose cost exceeds `acceptance_threshold` are dropped after solving
/// and both sides are reported unassigned. When several assignments have the
/// same total cost, the one that matches lower row indices wins.
pub fn solve_assignment(costs: &DMatrix<f64>, acceptance_threshold: f64) -> Assignment {
    let (rows, cols) = costs.shape();
    let mut row_taken = vec![false; rows];
    let mut col_taken = vec![false; cols];
    let mut pairs = vec![];

    let max_finite = costs
        .iter()
        .filter(|cost| cost.is_finite())
        .map(|&cost| r64(cost))
        .max();

    if let Some(max_finite) = max_finite {
        let size = rows.max(cols);
        let weights = quantized_weights(costs, max_finite.raw(), acceptance_threshold, size);
        let (_total, row_to_col) = kuhn_munkres_min(&weights);

        for (row, &col) in row_to_col.iter().enumerate().take(rows) {
            if col >= cols {
                continue;
            }
            let cost = costs[(row, col)];
            if cost.is_finite() && cost <= acceptance_threshold {
                pairs.push((row, col));
                row_taken[row] = true;
                col_taken[col] = true;
            }
        }
    }

    Assignment {
        pairs,
        unassigned_rows: (0..rows).filter(|&row| !row_taken[row]).collect(),
        unassigned_cols: (0..cols).filter(|&col| !col_taken[col]).collect(),
    }
}

/// Converts `costs` into a square integer matrix for the solver.
///
/// Each finite entry becomes `steps * tie_scale + row`, where `tie_scale`
/// exceeds the largest possible sum of row indices, so the row term only
/// separates assignments of equal rounded cost. Gated entries get a value
/// larger than any sum of finite entries, and padding cells are free.
///
/// Costs above `acceptance_threshold + 1` are rejected after solving either
/// way, so they are clamped there, and the step count is capped so that a
/// full row of gated entries still fits in an `i64`.
fn quantized_weights(
    costs: &DMatrix<f64>,
    max_finite: f64,
    acceptance_threshold: f64,
    size: usize,
) -> Matrix<i64> {
    let (rows, cols) = costs.shape();
    let side = size as i64 + 1;
    let tie_scale = (size as i64).saturating_mul(size as i64).saturating_add(1);
    let headroom = tie_scale
        .saturating_mul(side)
        .saturating_mul(side)
        .saturating_mul(2);
    let max_steps = i64::MAX / headroom;
    let ceiling = acceptance_threshold.max(0.0) + 1.0;
    let to_weight = |cost: f64, row: usize| {
        let steps = (cost.clamp(0.0, ceiling) * COST_STEPS_PER_UNIT).round() as i64;
        steps.min(max_steps) * tie_scale + row as i64
    };
    let gated = (to_weight(max_finite, size) + 1).saturating_mul(side);

    let mut weights = Matrix::new(size, size, 0_i64);
    for row in 0..rows {
        for col in 0..cols {
            let cost = costs[(row, col)];
            weights[(row, col)] = if cost.is_finite() {
                to_weight(cost, row)
            } else {
                gated
            };
        }
    }
    weights
}
