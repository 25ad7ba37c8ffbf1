//! Token-level precision, recall and F1 over padded index arrays.

use serde::{Deserialize, Serialize};

use super::{f1_score, ratio};
use crate::error::{Result, TagsmithError};

/// Micro-averaged F1 plus per-class vectors indexed by class id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenScores {
    pub micro_f1: f64,
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub f1: Vec<f64>,
}

/// Token evaluator. Classes in `ignore` still get per-class scores but do
/// not count towards the micro average (typically the `O` class).
#[derive(Debug, Clone)]
pub struct TokenEval {
    class_count: usize,
    ignore: Option<usize>,
}

impl TokenEval {
    pub fn new(class_count: usize) -> Self {
        Self {
            class_count,
            ignore: None,
        }
    }

    #[must_use]
    pub fn ignoring(mut self, class: Option<usize>) -> Self {
        self.ignore = class;
        self
    }

    /// Score predictions against gold labels, reading only the first
    /// `lengths[i]` positions of row `i`.
    pub fn compute_f1(
        &self,
        predicted: &[Vec<u32>],
        gold: &[Vec<u32>],
        lengths: &[usize],
    ) -> Result<TokenScores> {
        if predicted.len() != gold.len() || gold.len() != lengths.len() {
            return Err(TagsmithError::LengthMismatch {
                context: "token_f1 rows",
                expected: lengths.len(),
                actual: predicted.len().min(gold.len()),
            });
        }

        let n = self.class_count;
        let mut tp = vec![0usize; n];
        let mut fp = vec![0usize; n];
        let mut fn_ = vec![0usize; n];

        for ((pred_row, gold_row), &len) in predicted.iter().zip(gold).zip(lengths) {
            if len > pred_row.len() || len > gold_row.len() {
                return Err(TagsmithError::LengthMismatch {
                    context: "token_f1 row length",
                    expected: len,
                    actual: pred_row.len().min(gold_row.len()),
                });
            }

            for (&p, &g) in pred_row[..len].iter().zip(&gold_row[..len]) {
                let (p, g) = (p as usize, g as usize);
                for idx in [p, g] {
                    if idx >= n {
                        return Err(TagsmithError::InvalidTagIndex {
                            index: idx,
                            size: n,
                        });
                    }
                }
                if p == g {
                    tp[p] += 1;
                } else {
                    fp[p] += 1;
                    fn_[g] += 1;
                }
            }
        }

        let precision: Vec<f64> = (0..n).map(|c| ratio(tp[c], tp[c] + fp[c])).collect();
        let recall: Vec<f64> = (0..n).map(|c| ratio(tp[c], tp[c] + fn_[c])).collect();
        let f1 = precision
            .iter()
            .zip(&recall)
            .map(|(&p, &r)| f1_score(p, r))
            .collect();

        let counted = |c: &usize| Some(*c) != self.ignore;
        let sum = |v: &[usize]| (0..n).filter(counted).map(|c| v[c]).sum::<usize>();
        let (tp_all, fp_all, fn_all) = (sum(&tp), sum(&fp), sum(&fn_));
        let micro_f1 = f1_score(
            ratio(tp_all, tp_all + fp_all),
            ratio(tp_all, tp_all + fn_all),
        );

        Ok(TokenScores {
            micro_f1,
            precision,
            recall,
            f1,
        })
    }
}

/// Token-level F1 over every class.
pub fn token_f1(
    class_count: usize,
    predicted: &[Vec<u32>],
    gold: &[Vec<u32>],
    lengths: &[usize],
) -> Result<TokenScores> {
    TokenEval::new(class_count).compute_f1(predicted, gold, lengths)
}
