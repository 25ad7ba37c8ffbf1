//! Epoch loop with early stopping and best-model selection.

use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tagsmith_core::TagSet;
use tracing::{debug, info};

use crate::accumulator::{accumulate, EpochSummary};
use crate::checkpoint::{BestModelRecord, Checkpointer};
use crate::config::TrainConfig;
use crate::data::{load_conll, DataSource, EmbVec, Input, InputOptions, Vocabularies};
use crate::early_stopping::{EarlyStopping, Measure};
use crate::model::{Mode, SequenceModel, TaggerConfig, TaggerModel};
use crate::runner;
use crate::telemetry::Telemetry;

/// Token F1 gap within which a better chunk F1 still wins.
pub const SELECTION_EPSILON: f64 = 0.0005;

/// Whether a candidate beats the current best.
pub fn is_better(token_f1: f64, chunk_f1: f64, best_token_f1: f64, best_chunk_f1: f64) -> bool {
    token_f1 > best_token_f1
        || (best_token_f1 - token_f1 < SELECTION_EPSILON && chunk_f1 > best_chunk_f1)
}

/// Everything one training run operates on.
pub struct TrainingContext<'a> {
    pub model: &'a mut dyn SequenceModel,
    pub train: &'a mut dyn DataSource,
    pub dev: &'a mut dyn DataSource,
    pub tags: &'a TagSet,
    pub telemetry: &'a mut Telemetry,
    pub checkpointer: Checkpointer,
    pub epochs: usize,
    pub patience: usize,
}

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub early_stopped: bool,
    pub best: Option<BestModelRecord>,
    pub epochs: Vec<EpochSummary>,
}

#[derive(Debug, Clone, Copy, Default)]
struct BestScores {
    token_f1: f64,
    chunk_f1: f64,
}

/// Drives train and eval passes and decides what to keep.
///
/// Best-model bookkeeping lives here; the early-stopping monitor keeps its
/// own best, which is overwritten through [`EarlyStopping::reset`] after
/// every adoption.
pub struct Trainer<'a> {
    ctx: TrainingContext<'a>,
    early_stopping: EarlyStopping,
    best: BestScores,
    record: Option<BestModelRecord>,
}

impl<'a> Trainer<'a> {
    pub fn new(ctx: TrainingContext<'a>) -> Self {
        let early_stopping = EarlyStopping::new(ctx.patience, Measure::F1);
        Self {
            ctx,
            early_stopping,
            best: BestScores::default(),
            record: None,
        }
    }

    pub fn fit(mut self) -> Result<TrainingReport> {
        let mut summaries = Vec::new();
        let mut early_stopped = false;

        for epoch in 0..self.ctx.epochs {
            let summary = self.run_epoch(epoch)?;
            let (token_f1, chunk_f1) = (summary.token_f1(), summary.chunk_f1());
            summaries.push(summary.clone());

            if self.early_stopping.validate(token_f1) {
                early_stopped = true;
                info!(epoch = epoch + 1, status = %self.early_stopping.status(), "early stopping");
                break;
            }

            if is_better(token_f1, chunk_f1, self.best.token_f1, self.best.chunk_f1) {
                let record = self.ctx.checkpointer.save(
                    &*self.ctx.model,
                    epoch,
                    token_f1,
                    chunk_f1,
                    summary.avg_f1,
                )?;
                info!(
                    epoch = epoch + 1,
                    token_f1,
                    chunk_f1,
                    previous_token_f1 = self.best.token_f1,
                    previous_chunk_f1 = self.best.chunk_f1,
                    "new best model"
                );
                self.best = BestScores { token_f1, chunk_f1 };
                self.record = Some(record);
                self.early_stopping.reset(token_f1);
            }

            info!(epoch = epoch + 1, status = %self.early_stopping.status(), "early stopping status");
        }

        self.ctx.telemetry.flush()?;
        Ok(TrainingReport {
            epochs_run: summaries.len(),
            early_stopped,
            best: self.record,
            epochs: summaries,
        })
    }

    fn run_epoch(&mut self, epoch: usize) -> Result<EpochSummary> {
        let started = Instant::now();
        let ctx = &mut self.ctx;

        let planned = ctx.train.num_batches();
        runner::run(Mode::Train, &mut *ctx.train, &mut *ctx.model, planned, &mut *ctx.telemetry)
            .with_context(|| format!("epoch {} train pass", epoch + 1))?;

        let planned = ctx.dev.num_batches();
        let results = runner::run(Mode::Eval, &mut *ctx.dev, &mut *ctx.model, planned, &mut *ctx.telemetry)
            .with_context(|| format!("epoch {} eval pass", epoch + 1))?;
        let summary = accumulate(&results, planned, ctx.tags)?;

        ctx.telemetry.dev.write(
            summary.global_step,
            &[
                ("loss", summary.avg_loss),
                ("accuracy", summary.avg_accuracy),
                ("f1", summary.avg_f1),
                ("token_f1", summary.token_f1()),
                ("chunk_f1", summary.chunk_f1()),
            ],
        )?;

        info!(
            epoch = epoch + 1,
            elapsed_s = started.elapsed().as_secs_f64(),
            loss = summary.avg_loss,
            accuracy = summary.avg_accuracy,
            f1 = summary.avg_f1,
            token_f1 = summary.token_f1(),
            chunk_f1 = summary.chunk_f1(),
            "epoch finished"
        );
        debug!(
            precision = ?summary.token.precision,
            recall = ?summary.token.recall,
            f1 = ?summary.token.f1,
            "token scores per class"
        );
        debug!(
            precision = summary.chunk.precision,
            recall = summary.chunk.recall,
            f1 = summary.chunk.f1,
            "chunk scores"
        );
        Ok(summary)
    }
}

/// Load data, build the reference tagger and train it.
pub fn run_training(mut config: TrainConfig) -> Result<TrainingReport> {
    let train_sentences = load_conll(&config.train_file)?;
    let dev_sentences = load_conll(&config.dev_file)?;
    let embeddings = EmbVec::load(&config.emb_path, config.wrd_dim)?;
    let vocabs = Vocabularies::build(&train_sentences, &dev_sentences, embeddings, config.contextual)?;
    config.derive_steps(train_sentences.len());

    let options = InputOptions {
        batch_size: config.batch_size,
        word_length: config.word_length,
        shuffle: true,
        seed: config.seed,
    };
    let mut train = Input::new(&train_sentences, &vocabs, options.clone())
        .with_context(|| format!("encoding training data {}", config.train_file.display()))?;
    let mut dev = Input::new(
        &dev_sentences,
        &vocabs,
        InputOptions {
            shuffle: false,
            ..options
        },
    )
    .with_context(|| format!("encoding dev data {}", config.dev_file.display()))?;
    info!(
        train = train.num_examples(),
        dev = dev.num_examples(),
        max_train_len = train.max_sentence_length(),
        max_dev_len = dev.max_sentence_length(),
        tags = vocabs.tags.len(),
        scheme = ?vocabs.tags.scheme(),
        num_train_steps = config.num_train_steps,
        num_warmup_steps = config.num_warmup_steps,
        "data loaded"
    );

    let mut model = TaggerModel::new(
        TaggerConfig {
            learning_rate: config.learning_rate,
            num_train_steps: config.num_train_steps,
            num_warmup_steps: config.num_warmup_steps,
            contextual: config.contextual,
            ..Default::default()
        },
        &vocabs,
    )?;
    model.set_run_config(serde_json::to_value(&config)?);
    if let Some(path) = &config.restore {
        model.restore(path)?;
        info!(path = %path.display(), "restored weights");
    }

    let mut telemetry = Telemetry::open(&config.summary_dir)?;
    Trainer::new(TrainingContext {
        model: &mut model,
        train: &mut train,
        dev: &mut dev,
        tags: &vocabs.tags,
        telemetry: &mut telemetry,
        checkpointer: Checkpointer::new(&config.checkpoint_dir),
        epochs: config.epoch,
        patience: config.patience,
    })
    .fit()
}
