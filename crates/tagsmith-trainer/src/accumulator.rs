//! Folds eval step results into an epoch summary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tagsmith_core::{chunk_f1, ChunkScores, TagSet, TokenEval, TokenScores};

use crate::model::StepResult;

/// Aggregate metrics for one eval pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub avg_loss: f64,
    pub avg_accuracy: f64,
    pub avg_f1: f64,
    pub token: TokenScores,
    pub chunk: ChunkScores,
    pub global_step: u64,
    pub batches_completed: usize,
}

impl EpochSummary {
    pub fn token_f1(&self) -> f64 {
        self.token.micro_f1
    }

    pub fn chunk_f1(&self) -> f64 {
        self.chunk.f1
    }
}

/// Incremental accumulator. Averages divide by the planned batch count,
/// not the number of batches actually pushed.
#[derive(Debug, Clone, Default)]
pub struct MetricAccumulator {
    planned: usize,
    completed: usize,
    loss: f64,
    accuracy: f64,
    f1: f64,
    global_step: u64,
    predicted: Vec<Vec<u32>>,
    gold: Vec<Vec<u32>>,
    lengths: Vec<usize>,
}

impl MetricAccumulator {
    pub fn new(planned: usize) -> Self {
        Self {
            planned,
            ..Default::default()
        }
    }

    /// Add one eval step. Fails if the step carries no eval outputs.
    pub fn push(&mut self, result: &StepResult) -> Result<()> {
        let eval = result
            .eval
            .as_ref()
            .with_context(|| format!("step {} has no eval outputs", self.completed))?;

        self.loss += result.loss;
        self.accuracy += result.accuracy;
        self.f1 += result.f1;
        self.global_step = result.global_step;
        self.predicted.extend(eval.predicted.iter().cloned());
        self.gold.extend(eval.gold.iter().cloned());
        self.lengths.extend(&eval.lengths);
        self.completed += 1;
        Ok(())
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Predicted rows in arrival order.
    pub fn predicted(&self) -> &[Vec<u32>] {
        &self.predicted
    }

    pub fn gold(&self) -> &[Vec<u32>] {
        &self.gold
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn finish(self, tags: &TagSet) -> Result<EpochSummary> {
        let mean = |sum: f64| {
            if self.planned == 0 {
                0.0
            } else {
                sum / self.planned as f64
            }
        };

        let token = TokenEval::new(tags.len())
            .ignoring(tags.outside_index())
            .compute_f1(&self.predicted, &self.gold, &self.lengths)
            .context("computing token F1")?;

        let predicted_tags = tags.decode_sequences(&self.predicted, &self.lengths)?;
        let gold_tags = tags.decode_sequences(&self.gold, &self.lengths)?;
        let chunk = chunk_f1(&predicted_tags, &gold_tags).context("computing chunk F1")?;

        Ok(EpochSummary {
            avg_loss: mean(self.loss),
            avg_accuracy: mean(self.accuracy),
            avg_f1: mean(self.f1),
            token,
            chunk,
            global_step: self.global_step,
            batches_completed: self.completed,
        })
    }
}

/// Summarize a full set of eval step results.
pub fn accumulate(results: &[StepResult], planned: usize, tags: &TagSet) -> Result<EpochSummary> {
    let mut acc = MetricAccumulator::new(planned);
    for result in results {
        acc.push(result)?;
    }
    acc.finish(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EvalOutputs;

    fn tags() -> TagSet {
        TagSet::new(["O", "B-PER", "I-PER", "B-LOC"]).unwrap()
    }

    fn eval_step(loss: f64, predicted: Vec<Vec<u32>>, gold: Vec<Vec<u32>>, lengths: Vec<usize>) -> StepResult {
        StepResult {
            global_step: 7,
            loss,
            accuracy: 1.0,
            f1: 0.5,
            learning_rate: None,
            eval: Some(EvalOutputs {
                predicted,
                gold,
                lengths,
            }),
        }
    }

    #[test]
    fn test_averages_use_planned_count() {
        let results = vec![
            eval_step(1.0, vec![vec![0]], vec![vec![0]], vec![1]),
            eval_step(3.0, vec![vec![0]], vec![vec![0]], vec![1]),
        ];
        let summary = accumulate(&results, 4, &tags()).unwrap();
        assert_eq!(summary.avg_loss, 1.0);
        assert_eq!(summary.avg_accuracy, 0.5);
        assert_eq!(summary.avg_f1, 0.25);
        assert_eq!(summary.batches_completed, 2);
        assert_eq!(summary.global_step, 7);
    }

    #[test]
    fn test_zero_planned_batches() {
        let summary = accumulate(&[], 0, &tags()).unwrap();
        assert_eq!(summary.avg_loss, 0.0);
        assert_eq!(summary.batches_completed, 0);
    }

    #[test]
    fn test_token_and_chunk_scores() {
        let gold = vec![vec![1, 2, 0, 3]];
        let results = vec![eval_step(0.1, gold.clone(), gold, vec![4])];
        let summary = accumulate(&results, 1, &tags()).unwrap();
        assert_eq!(summary.token_f1(), 1.0);
        assert_eq!(summary.chunk_f1(), 1.0);
        assert_eq!(summary.token.f1.len(), 4);
    }

    #[test]
    fn test_padding_is_ignored() {
        let results = vec![eval_step(
            0.1,
            vec![vec![1, 2, 3, 3]],
            vec![vec![1, 2, 0, 0]],
            vec![2],
        )];
        let summary = accumulate(&results, 1, &tags()).unwrap();
        assert_eq!(summary.token_f1(), 1.0);
        assert_eq!(summary.chunk_f1(), 1.0);
    }

    #[test]
    fn test_train_result_is_rejected() {
        let mut train = eval_step(0.1, vec![], vec![], vec![]);
        train.eval = None;
        train.learning_rate = Some(0.001);
        let err = accumulate(&[train], 1, &tags()).unwrap_err();
        assert!(err.to_string().contains("no eval outputs"));
    }
}
