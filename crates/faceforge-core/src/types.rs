use serde::{Deserialize, Serialize};

/// One named blendshape score in [0, 1], produced fresh each tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedScore {
    pub name: String,
    pub score: f32,
}

impl NamedScore {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Per-tick output of the inference capability for a single face.
///
/// `transform` is a 4x4 homogeneous matrix in column-major order when the
/// model emitted one. It is kept as a plain vector so a malformed length
/// can be detected (and skipped) at the pose-retargeting site rather than
/// rejected at construction.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub scores: Vec<NamedScore>,
    pub transform: Option<Vec<f32>>,
}

impl Detection {
    /// Scores sorted by descending value, truncated to `n`. Used for status
    /// display and the analysis prompt.
    pub fn top_scores(&self, n: usize) -> Vec<&NamedScore> {
        let mut sorted: Vec<&NamedScore> = self.scores.iter().collect();
        sorted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted.truncate(n);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_scores_descending() {
        let det = Detection {
            scores: vec![
                NamedScore::new("jawOpen", 0.2),
                NamedScore::new("mouthSmileLeft", 0.9),
                NamedScore::new("browInnerUp", 0.5),
            ],
            transform: None,
        };
        let top = det.top_scores(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "mouthSmileLeft");
        assert_eq!(top[1].name, "browInnerUp");
    }

    #[test]
    fn test_top_scores_n_larger_than_len() {
        let det = Detection {
            scores: vec![NamedScore::new("jawOpen", 0.2)],
            transform: None,
        };
        assert_eq!(det.top_scores(5).len(), 1);
    }
}
