use crate::track::{Observation, ObservationKind};
use itertools::Itertools;
use std::iter;

/// Fills every interior gap of a frame-ordered history by linear
/// interpolation of the box corners and the score. Nothing is added before
/// the first or after the last observation.
pub fn fill_gaps(history: &[Observation]) -> Vec<Observation> {
    let Some(last) = history.last() else {
        return vec![];
    };

    history
        .iter()
        .tuple_windows()
        .flat_map(|(from, to)| iter::once(*from).chain(between(from, to)))
        .chain(iter::once(*last))
        .collect()
}

fn between<'a>(
    from: &'a Observation,
    to: &'a Observation,
) -> impl Iterator<Item = Observation> + 'a {
    let span = to.frame.saturating_sub(from.frame);
    (1..span).map(move |step| {
        let t = step as f64 / span as f64;
        Observation {
            frame: from.frame + step,
            bbox: from.bbox.lerp(&to.bbox, t),
            score: from.score + (to.score - from.score) * t,
            kind: ObservationKind::Interpolated,
        }
    })
}
