//! One train or eval pass over a data source.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, enabled, Level};

use crate::data::{Batch, DataSource};
use crate::model::{Mode, SequenceModel, StepResult};
use crate::telemetry::{StepProgress, Telemetry};

/// Run up to `step_count` steps from a fresh pass of `source`.
///
/// The pass ends early without error when the source is exhausted. In eval
/// mode each result carries the batch's gold tags and lengths.
pub fn run(
    mode: Mode,
    source: &mut dyn DataSource,
    model: &mut dyn SequenceModel,
    step_count: usize,
    telemetry: &mut Telemetry,
) -> Result<Vec<StepResult>> {
    let started = Instant::now();
    source.reset().context("resetting data source")?;

    let mut results = Vec::with_capacity(step_count);
    for step in 0..step_count {
        let Some(batch) = source.next_batch()? else {
            debug!(?mode, step, planned = step_count, "data source exhausted");
            break;
        };

        if step == 0 && model.capabilities().contextual && enabled!(Level::DEBUG) {
            dump_contextual(&batch);
        }

        let mut result = model
            .execute(&batch, mode)
            .with_context(|| format!("{mode:?} step {step}"))?;

        if let Some(eval) = result.eval.as_mut() {
            eval.gold = batch.tags;
            eval.lengths = batch.lengths;
        }

        telemetry.progress.on_step(&StepProgress {
            mode,
            step,
            total: step_count,
            loss: result.loss,
            accuracy: result.accuracy,
            f1: result.f1,
            learning_rate: result.learning_rate,
        });

        if mode.is_training() {
            let mut scalars = vec![
                ("loss", result.loss),
                ("accuracy", result.accuracy),
                ("f1", result.f1),
            ];
            if let Some(lr) = result.learning_rate {
                scalars.push(("learning_rate", lr));
            }
            telemetry.train.write(result.global_step, &scalars)?;
        }

        results.push(result);
    }

    debug!(
        ?mode,
        steps = results.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "pass finished"
    );
    Ok(results)
}

fn dump_contextual(batch: &Batch) {
    let Some(ctx) = batch.contextual.as_ref() else {
        debug!("contextual channel enabled but first batch has none");
        return;
    };
    let rows = |m: &[Vec<u32>]| m.iter().take(2).cloned().collect::<Vec<_>>();
    debug!(
        shape = ?(ctx.token_ids.len(), batch.max_sentence_length),
        token_ids = ?rows(&ctx.token_ids),
        token_masks = ?rows(&ctx.token_masks),
        segment_ids = ?rows(&ctx.segment_ids),
        "first contextual batch"
    );
}
