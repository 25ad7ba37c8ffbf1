//! Token-level and chunk-level evaluation.

pub mod chunk;
pub mod token;

pub use chunk::{chunk_f1, extract_entities, ChunkScores};
pub use token::{token_f1, TokenEval, TokenScores};

/// Harmonic mean of precision and recall, 0 when both are 0.
pub fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

pub(crate) fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f1_score() {
        assert_eq!(f1_score(0.0, 0.0), 0.0);
        assert!((f1_score(0.5, 1.0) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(ratio(1, 0), 0.0);
    }
}
