//! # Constrained Viterbi Decoding
//!
//! Finds the highest scoring tag path given per-position emission scores,
//! a transition score matrix and the chunk-validity constraints of a
//! [`TagSet`].

use crate::error::{Result, TagsmithError};
use crate::tags::TagSet;

/// Viterbi decoder for tag sequences.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
    allowed: Vec<Vec<bool>>,
    allowed_start: Vec<bool>,
}

/// Path score and backpointer for one DP cell.
#[derive(Debug, Clone, Copy)]
struct PathState {
    score: f32,
    prev_tag: Option<usize>,
}

impl ViterbiDecoder {
    /// Decoder that forbids transitions the tag set considers invalid.
    pub fn constrained(tags: &TagSet) -> Self {
        Self {
            num_tags: tags.len(),
            allowed: tags.transition_mask(),
            allowed_start: tags.start_mask(),
        }
    }

    /// Decoder with every transition allowed.
    pub fn unconstrained(num_tags: usize) -> Self {
        Self {
            num_tags,
            allowed: vec![vec![true; num_tags]; num_tags],
            allowed_start: vec![true; num_tags],
        }
    }

    /// Decode the optimal tag sequence.
    ///
    /// # Arguments
    /// * `emission_scores` - `[seq_len][num_tags]` emission scores
    /// * `transitions` - optional `[num_tags][num_tags]` scores indexed
    ///   `[from][to]`; `None` means all zeros
    pub fn decode(
        &self,
        emission_scores: &[Vec<f32>],
        transitions: Option<&[Vec<f32>]>,
    ) -> Result<Vec<usize>> {
        let seq_len = emission_scores.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }

        if let Some(row) = emission_scores.iter().find(|row| row.len() != self.num_tags) {
            return Err(TagsmithError::DimensionMismatch(format!(
                "emission row has {} scores, expected {}",
                row.len(),
                self.num_tags
            )));
        }
        if let Some(matrix) = transitions {
            if matrix.len() != self.num_tags || matrix.iter().any(|r| r.len() != self.num_tags) {
                return Err(TagsmithError::DimensionMismatch(format!(
                    "transition matrix must be {n}x{n}",
                    n = self.num_tags
                )));
            }
        }

        let unreachable = PathState {
            score: f32::NEG_INFINITY,
            prev_tag: None,
        };
        let mut dp = vec![vec![unreachable; self.num_tags]; seq_len];

        for tag in 0..self.num_tags {
            if self.allowed_start[tag] {
                dp[0][tag].score = emission_scores[0][tag];
            }
        }

        for pos in 1..seq_len {
            for curr in 0..self.num_tags {
                let mut best = unreachable;

                for prev in 0..self.num_tags {
                    if !self.allowed[prev][curr] || dp[pos - 1][prev].score == f32::NEG_INFINITY {
                        continue;
                    }

                    let transition = transitions.map_or(0.0, |m| m[prev][curr]);
                    let score = dp[pos - 1][prev].score + transition;
                    if score > best.score {
                        best = PathState {
                            score,
                            prev_tag: Some(prev),
                        };
                    }
                }

                if best.prev_tag.is_some() {
                    best.score += emission_scores[pos][curr];
                }
                dp[pos][curr] = best;
            }
        }

        let mut best_final_tag = 0;
        let mut best_final_score = f32::NEG_INFINITY;
        for (tag, state) in dp[seq_len - 1].iter().enumerate() {
            if state.score > best_final_score {
                best_final_score = state.score;
                best_final_tag = tag;
            }
        }

        let mut path = Vec::with_capacity(seq_len);
        path.push(best_final_tag);
        let mut curr = best_final_tag;
        for pos in (1..seq_len).rev() {
            curr = dp[pos][curr].prev_tag.unwrap_or(0);
            path.push(curr);
        }

        path.reverse();
        Ok(path)
    }
}
