//! # Reference Tagger
//!
//! A feed-forward tagger built with candle: frozen pretrained word
//! embeddings, mean-pooled character embeddings, POS/chunk embeddings and
//! an optional contextual channel, followed by a hidden layer and a
//! per-position output projection. Eval predictions are decoded with
//! BIO-constrained Viterbi over the log-softmax emissions.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{
    embedding, linear, loss, ops, AdamW, Embedding, Linear, Module, Optimizer, ParamsAdamW,
    VarBuilder, VarMap,
};
use serde::{Deserialize, Serialize};
use tagsmith_core::{TagSet, TokenEval, ViterbiDecoder};
use tracing::debug;

use super::{Capabilities, EvalOutputs, GraphDef, Mode, SequenceModel, StepResult};
use crate::data::{Batch, Vocabularies};

/// Hyperparameters of [`TaggerModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggerConfig {
    pub char_dim: usize,
    pub pos_dim: usize,
    pub chk_dim: usize,
    pub contextual_dim: usize,
    pub hidden_dim: usize,
    pub dropout: f32,
    pub learning_rate: f64,
    /// Total planned train steps; 0 keeps the rate constant after warmup.
    pub num_train_steps: usize,
    pub num_warmup_steps: usize,
    pub contextual: bool,
    pub constrained_decoding: bool,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            char_dim: 25,
            pos_dim: 7,
            chk_dim: 10,
            contextual_dim: 32,
            hidden_dim: 128,
            dropout: 0.3,
            learning_rate: 0.001,
            num_train_steps: 0,
            num_warmup_steps: 1,
            contextual: false,
            constrained_decoding: true,
        }
    }
}

impl TaggerConfig {
    /// Linear warmup to the base rate, then linear decay to zero.
    pub fn learning_rate_at(&self, step: u64) -> f64 {
        let step = step as f64;
        let warmup = self.num_warmup_steps.max(1) as f64;
        let total = self.num_train_steps as f64;

        if step < warmup {
            self.learning_rate * step / warmup
        } else if total <= warmup {
            self.learning_rate
        } else {
            self.learning_rate * ((total - step) / (total - warmup)).clamp(0.0, 1.0)
        }
    }
}

pub struct TaggerModel {
    config: TaggerConfig,
    tags: TagSet,
    device: Device,
    varmap: VarMap,
    word_emb: Embedding,
    char_emb: Embedding,
    pos_emb: Embedding,
    chk_emb: Embedding,
    contextual_emb: Option<Embedding>,
    hidden: Linear,
    output: Linear,
    optimizer: AdamW,
    decoder: ViterbiDecoder,
    dims: BTreeMap<String, usize>,
    run_config: serde_json::Value,
    step: u64,
}

impl TaggerModel {
    pub fn new(config: TaggerConfig, vocabs: &Vocabularies) -> Result<Self> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let wrd_dim = vocabs.words.dim();
        let table = Tensor::from_slice(vocabs.words.matrix(), (vocabs.words.vocab_size(), wrd_dim), &device)?;
        let word_emb = Embedding::new(table, wrd_dim);

        let char_emb = embedding(vocabs.chars.vocab_size(), config.char_dim, vb.pp("char_emb"))?;
        let pos_emb = embedding(vocabs.pos.len(), config.pos_dim, vb.pp("pos_emb"))?;
        let chk_emb = embedding(vocabs.chunks.len(), config.chk_dim, vb.pp("chk_emb"))?;

        let contextual_emb = if config.contextual {
            let vocab = vocabs
                .contextual
                .as_ref()
                .context("contextual channel enabled but no contextual vocabulary was built")?;
            Some(embedding(vocab.len(), config.contextual_dim, vb.pp("contextual_emb"))?)
        } else {
            None
        };

        let contextual_dim = if config.contextual { config.contextual_dim } else { 0 };
        let input_dim = wrd_dim + config.char_dim + config.pos_dim + config.chk_dim + contextual_dim;
        let hidden = linear(input_dim, config.hidden_dim, vb.pp("hidden"))?;
        let output = linear(config.hidden_dim, vocabs.tags.len(), vb.pp("output"))?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                ..Default::default()
            },
        )?;

        let decoder = if config.constrained_decoding {
            ViterbiDecoder::constrained(&vocabs.tags)
        } else {
            ViterbiDecoder::unconstrained(vocabs.tags.len())
        };

        let dims = BTreeMap::from([
            ("word_vocab".to_string(), vocabs.words.vocab_size()),
            ("word_dim".to_string(), wrd_dim),
            ("char_vocab".to_string(), vocabs.chars.vocab_size()),
            ("input_dim".to_string(), input_dim),
            ("hidden_dim".to_string(), config.hidden_dim),
            ("num_tags".to_string(), vocabs.tags.len()),
        ]);

        Ok(Self {
            tags: vocabs.tags.clone(),
            config,
            device,
            varmap,
            word_emb,
            char_emb,
            pos_emb,
            chk_emb,
            contextual_emb,
            hidden,
            output,
            optimizer,
            decoder,
            dims,
            run_config: serde_json::Value::Null,
            step: 0,
        })
    }

    fn ids(&self, rows: &[Vec<u32>], len: usize) -> Result<Tensor> {
        let flat: Vec<u32> = rows.iter().flatten().copied().collect();
        Ok(Tensor::from_vec(flat, (rows.len(), len), &self.device)?)
    }

    /// Masked mean of character embeddings per word, `[b, L, char_dim]`.
    fn char_features(&self, batch: &Batch) -> Result<Tensor> {
        let (b, l) = (batch.size(), batch.max_sentence_length);
        let width = batch
            .char_ids
            .iter()
            .flatten()
            .map(Vec::len)
            .next()
            .unwrap_or(0)
            .max(1);

        let mut flat = Vec::with_capacity(b * l * width);
        let mut counts = Vec::with_capacity(b * l);
        for word in batch.char_ids.iter().flatten() {
            let mut row = word.clone();
            row.resize(width, 0);
            counts.push(row.iter().filter(|&&c| c != 0).count().max(1) as f32);
            flat.extend(row);
        }
        let mask: Vec<f32> = flat.iter().map(|&c| if c == 0 { 0.0 } else { 1.0 }).collect();

        let chars = Tensor::from_vec(flat, (b, l, width), &self.device)?;
        let mask = Tensor::from_vec(mask, (b, l, width, 1), &self.device)?;
        let counts = Tensor::from_vec(counts, (b, l, 1), &self.device)?;

        let summed = self.char_emb.forward(&chars)?.broadcast_mul(&mask)?.sum(2)?;
        Ok(summed.broadcast_div(&counts)?)
    }

    /// Emission logits, `[b, L, num_tags]`.
    fn forward(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let l = batch.max_sentence_length;
        let mut parts = vec![
            self.word_emb.forward(&self.ids(&batch.word_ids, l)?)?,
            self.char_features(batch)?,
            self.pos_emb.forward(&self.ids(&batch.pos_ids, l)?)?,
            self.chk_emb.forward(&self.ids(&batch.chk_ids, l)?)?,
        ];

        if let Some(emb) = &self.contextual_emb {
            let ctx = batch
                .contextual
                .as_ref()
                .context("model expects the contextual channel but the batch has none")?;
            let masks: Vec<f32> = ctx.token_masks.iter().flatten().map(|&m| m as f32).collect();
            let masks = Tensor::from_vec(masks, (batch.size(), l, 1), &self.device)?;
            parts.push(emb.forward(&self.ids(&ctx.token_ids, l)?)?.broadcast_mul(&masks)?);
        }

        let mut x = Tensor::cat(&parts, 2)?;
        if train {
            x = ops::dropout(&x, self.config.dropout)?;
        }
        let mut h = self.hidden.forward(&x)?.relu()?;
        if train {
            h = ops::dropout(&h, self.config.dropout)?;
        }
        Ok(self.output.forward(&h)?)
    }

    fn decode(&self, logits: &Tensor, lengths: &[usize], width: usize) -> Result<Vec<Vec<u32>>> {
        let scores = ops::log_softmax(logits, D::Minus1)?.to_vec3::<f32>()?;
        scores
            .into_iter()
            .zip(lengths)
            .map(|(rows, &len)| -> Result<Vec<u32>> {
                let path = self.decoder.decode(&rows[..len], None)?;
                let mut ids: Vec<u32> = path.into_iter().map(|t| t as u32).collect();
                ids.resize(width, 0);
                Ok(ids)
            })
            .collect()
    }

    /// Attach the run configuration recorded in [`GraphDef::config`].
    pub fn set_run_config(&mut self, run_config: serde_json::Value) {
        self.run_config = run_config;
    }
}

impl SequenceModel for TaggerModel {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            contextual: self.contextual_emb.is_some(),
        }
    }

    fn execute(&mut self, batch: &Batch, mode: Mode) -> Result<StepResult> {
        let (b, l) = (batch.size(), batch.max_sentence_length);
        let logits = self.forward(batch, mode.is_training())?;
        let num_tags = self.tags.len();

        let mut positions = Vec::with_capacity(batch.token_count());
        let mut gold = Vec::with_capacity(batch.token_count());
        for (i, &len) in batch.lengths.iter().enumerate() {
            for j in 0..len {
                positions.push((i * l + j) as u32);
                gold.push(batch.tags[i][j]);
            }
        }
        if positions.is_empty() {
            anyhow::bail!("batch of {b} examples has no labelled positions");
        }

        let idx = Tensor::from_vec(positions, gold.len(), &self.device)?;
        let targets = Tensor::from_vec(gold.clone(), gold.len(), &self.device)?;
        let selected = logits.reshape((b * l, num_tags))?.index_select(&idx, 0)?;
        let loss = loss::cross_entropy(&selected, &targets)?;

        let (learning_rate, predicted_flat, eval) = match mode {
            Mode::Train => {
                self.step += 1;
                let lr = self.config.learning_rate_at(self.step);
                self.optimizer.set_learning_rate(lr);
                self.optimizer.backward_step(&loss)?;
                let argmax = selected.argmax(D::Minus1)?.to_vec1::<u32>()?;
                (Some(lr), argmax, None)
            }
            Mode::Eval => {
                let predicted = self.decode(&logits, &batch.lengths, l)?;
                let flat = predicted
                    .iter()
                    .zip(&batch.lengths)
                    .flat_map(|(row, &len)| row[..len].iter().copied())
                    .collect();
                let eval = EvalOutputs {
                    predicted,
                    gold: Vec::new(),
                    lengths: batch.lengths.clone(),
                };
                (None, flat, Some(eval))
            }
        };

        let n = gold.len();
        let correct = predicted_flat.iter().zip(&gold).filter(|(p, g)| p == g).count();
        let f1 = TokenEval::new(num_tags)
            .ignoring(self.tags.outside_index())
            .compute_f1(&[predicted_flat], &[gold], &[n])?
            .micro_f1;

        Ok(StepResult {
            global_step: self.step,
            loss: loss.to_scalar::<f32>()? as f64,
            accuracy: correct as f64 / n as f64,
            f1,
            learning_rate,
            eval,
        })
    }

    fn global_step(&self) -> u64 {
        self.step
    }

    fn save_weights(&self, path: &Path) -> Result<()> {
        self.varmap
            .save(path)
            .with_context(|| format!("saving weights to {}", path.display()))
    }

    fn restore(&mut self, path: &Path) -> Result<()> {
        self.varmap
            .load(path)
            .with_context(|| format!("restoring weights from {}", path.display()))?;
        debug!(path = %path.display(), "model restored");
        Ok(())
    }

    fn graph_def(&self) -> GraphDef {
        GraphDef {
            architecture: "feedforward-tagger".to_string(),
            capabilities: self.capabilities(),
            tags: self.tags.labels().to_vec(),
            dims: self.dims.clone(),
            config: serde_json::Value::Object(serde_json::Map::from_iter([
                (
                    "model".to_string(),
                    serde_json::to_value(&self.config).unwrap_or_default(),
                ),
                ("run".to_string(), self.run_config.clone()),
            ])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{parse_conll, DataSource, EmbVec, Input, InputOptions};

    const TRAIN: &str = "Peter NNP B-NP B-PER
Blackburn NNP I-NP I-PER
visited VBD B-VP O
Paris NNP B-NP B-LOC

Paris NNP B-NP B-LOC
is VBZ B-VP O
big JJ B-ADJP O
";

    fn fixture(contextual: bool) -> (TaggerModel, Input) {
        let sentences = parse_conll(TRAIN.as_bytes()).unwrap();
        let emb = EmbVec::from_reader("paris 0.5 0.1 0.2\npeter 0.3 0.9 0.1\n".as_bytes(), 3).unwrap();
        let vocabs = Vocabularies::build(&sentences, &[], emb, contextual).unwrap();
        let config = TaggerConfig {
            hidden_dim: 16,
            learning_rate: 0.01,
            contextual,
            ..Default::default()
        };
        let model = TaggerModel::new(config, &vocabs).unwrap();
        let input = Input::new(
            &sentences,
            &vocabs,
            InputOptions {
                batch_size: 2,
                word_length: 6,
                shuffle: false,
                seed: 1,
            },
        )
        .unwrap();
        (model, input)
    }

    fn first_batch(input: &mut Input) -> Batch {
        input.reset().unwrap();
        input.next_batch().unwrap().unwrap()
    }

    #[test]
    fn test_learning_rate_schedule() {
        let config = TaggerConfig {
            learning_rate: 1.0,
            num_warmup_steps: 4,
            num_train_steps: 8,
            ..Default::default()
        };
        assert_eq!(config.learning_rate_at(2), 0.5);
        assert_eq!(config.learning_rate_at(4), 1.0);
        assert_eq!(config.learning_rate_at(6), 0.5);
        assert_eq!(config.learning_rate_at(10), 0.0);

        let constant = TaggerConfig {
            learning_rate: 0.1,
            ..Default::default()
        };
        assert_eq!(constant.learning_rate_at(100), 0.1);
    }

    #[test]
    fn test_train_step_advances_global_step() {
        let (mut model, mut input) = fixture(false);
        let batch = first_batch(&mut input);

        let result = model.execute(&batch, Mode::Train).unwrap();
        assert_eq!(result.global_step, 1);
        assert!(result.loss.is_finite());
        assert!(result.learning_rate.is_some());
        assert!(result.eval.is_none());
        assert!((0.0..=1.0).contains(&result.accuracy));

        model.execute(&batch, Mode::Train).unwrap();
        assert_eq!(model.global_step(), 2);
    }

    #[test]
    fn test_eval_step_returns_valid_paths() {
        let (mut model, mut input) = fixture(false);
        let batch = first_batch(&mut input);

        let result = model.execute(&batch, Mode::Eval).unwrap();
        assert_eq!(result.global_step, 0);
        assert!(result.learning_rate.is_none());

        let eval = result.eval.unwrap();
        assert_eq!(eval.lengths, batch.lengths);
        assert_eq!(eval.predicted.len(), batch.size());
        assert!(eval.predicted.iter().all(|row| row.len() == batch.max_sentence_length));

        let tags = TagSet::new(["O", "B-PER", "I-PER", "B-LOC"]).unwrap();
        for (row, &len) in eval.predicted.iter().zip(&eval.lengths) {
            let first = tags.tag(row[0] as usize).unwrap();
            assert!(first.is_valid_start());
            assert!(row[len..].iter().all(|&t| t == 0));
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        let (mut model, mut input) = fixture(false);
        let batch = first_batch(&mut input);

        let before = model.execute(&batch, Mode::Eval).unwrap().loss;
        for _ in 0..60 {
            model.execute(&batch, Mode::Train).unwrap();
        }
        let after = model.execute(&batch, Mode::Eval).unwrap().loss;
        assert!(after < before, "loss did not drop: {before} -> {after}");
    }

    #[test]
    fn test_save_and_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ner_model");
        let (mut model, mut input) = fixture(false);
        let batch = first_batch(&mut input);

        model.execute(&batch, Mode::Train).unwrap();
        model.save_weights(&path).unwrap();
        let saved = model.execute(&batch, Mode::Eval).unwrap();

        for _ in 0..5 {
            model.execute(&batch, Mode::Train).unwrap();
        }
        model.restore(&path).unwrap();
        let restored = model.execute(&batch, Mode::Eval).unwrap();

        assert!((saved.loss - restored.loss).abs() < 1e-6);
        assert_eq!(saved.eval, restored.eval);
    }

    #[test]
    fn test_contextual_capability() {
        let (mut model, mut input) = fixture(true);
        assert!(model.capabilities().contextual);
        let batch = first_batch(&mut input);
        assert!(model.execute(&batch, Mode::Train).is_ok());

        let mut stripped = batch.clone();
        stripped.contextual = None;
        assert!(model.execute(&stripped, Mode::Eval).is_err());
    }

    #[test]
    fn test_graph_def_serializes() {
        let (model, _) = fixture(false);
        let graph = model.graph_def();
        assert_eq!(graph.tags[0], "O");
        assert_eq!(graph.dims["num_tags"], 4);
        let text = serde_json::to_string_pretty(&graph).unwrap();
        let back: GraphDef = serde_json::from_str(&text).unwrap();
        assert_eq!(back, graph);
    }
}
