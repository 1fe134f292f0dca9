use crate::{bbox::BBox, error::DetectionIssue};
use nalgebra::DVector;

/// One candidate object in one frame, before any identity is assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub score: f64,
    pub embedding: Option<DVector<f64>>,
}

impl Detection {
    pub fn new(bbox: BBox, score: f64) -> Self {
        Self {
            bbox,
            score,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: DVector<f64>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Checks the detection against the frame-boundary rules. `embedding_dim`
    /// is the dimensionality every embedding of the sequence must have, if it
    /// is known yet.
    pub fn validate(&self, embedding_dim: Option<usize>) -> Result<(), DetectionIssue> {
        let bbox = &self.bbox;
        if !bbox.is_finite() {
            return Err(DetectionIssue::NonFiniteBox);
        }
        if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return Err(DetectionIssue::EmptyBox {
                width: bbox.width(),
                height: bbox.height(),
            });
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Err(DetectionIssue::ScoreOutOfRange(self.score));
        }

        let Some(embedding) = &self.embedding else {
            return Ok(());
        };
        if let Some(expected) = embedding_dim {
            if embedding.len() != expected {
                return Err(DetectionIssue::EmbeddingDimension {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        if embedding.iter().any(|value| !value.is_finite()) {
            return Err(DetectionIssue::NonFiniteEmbedding);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det() -> Detection {
        Detection::new(BBox::new(0.0, 0.0, 10.0, 10.0), 0.9)
    }

    #[test]
    fn plain_detection_is_valid() {
        assert_eq!(det().validate(None), Ok(()));
        assert_eq!(det().validate(Some(128)), Ok(()));
    }

    #[test]
    fn nan_score_is_rejected() {
        let detection = Detection {
            score: f64::NAN,
            ..det()
        };
        assert!(matches!(
            detection.validate(None),
            Err(DetectionIssue::ScoreOutOfRange(_))
        ));
    }

    #[test]
    fn inverted_box_is_rejected() {
        let detection = Detection {
            bbox: BBox::new(10.0, 0.0, 0.0, 10.0),
            ..det()
        };
        assert!(matches!(
            detection.validate(None),
            Err(DetectionIssue::EmptyBox { .. })
        ));
    }

    #[test]
    fn wrong_embedding_length_is_rejected() {
        let detection = det().with_embedding(DVector::from_vec(vec![1.0, 0.0, 0.0]));
        assert_eq!(
            detection.validate(Some(4)),
            Err(DetectionIssue::EmbeddingDimension {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(detection.validate(Some(3)), Ok(()));
    }

    #[test]
    fn infinite_coordinates_are_rejected() {
        let detection = Detection {
            bbox: BBox::new(0.0, 0.0, f64::INFINITY, 10.0),
            ..det()
        };
        assert_eq!(detection.validate(None), Err(DetectionIssue::NonFiniteBox));
    }
}
