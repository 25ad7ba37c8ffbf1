#![allow(dead_code)]

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use tagsmith_trainer::{
    Batch, Capabilities, DataSource, EvalOutputs, GraphDef, Mode, SequenceModel, StepResult,
};

pub const LABELS: [&str; 3] = ["O", "B-PER", "I-PER"];

/// Batch whose only meaningful channel is `tags`.
pub fn batch(tags: Vec<Vec<u32>>, lengths: Vec<usize>) -> Batch {
    let width = tags.iter().map(Vec::len).max().unwrap_or(0);
    let zeros = vec![vec![0; width]; tags.len()];
    Batch {
        word_ids: zeros.clone(),
        char_ids: vec![vec![vec![0; 2]; width]; tags.len()],
        pos_ids: zeros.clone(),
        chk_ids: zeros,
        contextual: None,
        tags,
        lengths,
        max_sentence_length: width,
    }
}

/// Fixed batches with a planned count that may exceed what is available.
pub struct VecSource {
    batches: Vec<Batch>,
    planned: usize,
    cursor: usize,
    pub resets: usize,
}

impl VecSource {
    pub fn new(batches: Vec<Batch>, planned: usize) -> Self {
        Self {
            batches,
            planned,
            cursor: 0,
            resets: 0,
        }
    }
}

impl DataSource for VecSource {
    fn num_batches(&self) -> usize {
        self.planned
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        self.resets += 1;
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        let next = self.batches.get(self.cursor).cloned();
        self.cursor += 1;
        Ok(next)
    }
}

/// Prediction strategy for one epoch of eval.
#[derive(Debug, Clone, Copy)]
pub enum Quality {
    /// Echo gold. Token F1 1.0, chunk F1 1.0 on `[B-PER, I-PER]`.
    Perfect,
    /// `[B-PER, B-PER]`. Token F1 0.5, chunk F1 0.0.
    Split,
    /// `[I-PER, I-PER]`. Token F1 0.5, chunk F1 1.0.
    Dangling,
    /// All `O`.
    Nothing,
}

/// Model that replays one [`Quality`] per epoch and takes exactly one train
/// batch per epoch.
pub struct ScriptedModel {
    schedule: Vec<Quality>,
    step: u64,
    pub losses: Vec<f64>,
    pub saves: Cell<usize>,
    pub fail_on_step: Option<u64>,
}

impl ScriptedModel {
    pub fn new(schedule: Vec<Quality>) -> Self {
        Self {
            schedule,
            step: 0,
            losses: vec![1.0],
            saves: Cell::new(0),
            fail_on_step: None,
        }
    }

    fn predict(&self, gold: &[u32]) -> Vec<u32> {
        let epoch = (self.step as usize).saturating_sub(1);
        let quality = self.schedule.get(epoch).copied().unwrap_or(Quality::Nothing);
        match quality {
            Quality::Perfect => gold.to_vec(),
            Quality::Split => gold.iter().map(|&t| if t == 0 { 0 } else { 1 }).collect(),
            Quality::Dangling => gold.iter().map(|&t| if t == 0 { 0 } else { 2 }).collect(),
            Quality::Nothing => vec![0; gold.len()],
        }
    }
}

impl SequenceModel for ScriptedModel {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn execute(&mut self, batch: &Batch, mode: Mode) -> Result<StepResult> {
        if mode.is_training() {
            self.step += 1;
        }
        if self.fail_on_step == Some(self.step) {
            anyhow::bail!("scripted failure at step {}", self.step);
        }
        let loss = self.losses[(self.step as usize) % self.losses.len()];
        let eval = (!mode.is_training()).then(|| EvalOutputs {
            predicted: batch.tags.iter().map(|row| self.predict(row)).collect(),
            gold: Vec::new(),
            lengths: Vec::new(),
        });
        Ok(StepResult {
            global_step: self.step,
            loss,
            accuracy: 0.5,
            f1: 0.25,
            learning_rate: mode.is_training().then_some(0.001),
            eval,
        })
    }

    fn global_step(&self) -> u64 {
        self.step
    }

    fn save_weights(&self, path: &Path) -> Result<()> {
        fs::write(path, b"weights")?;
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }

    fn restore(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn graph_def(&self) -> GraphDef {
        GraphDef {
            architecture: "scripted".to_string(),
            capabilities: self.capabilities(),
            tags: LABELS.iter().map(|s| s.to_string()).collect(),
            dims: BTreeMap::new(),
            config: serde_json::Value::Null,
        }
    }
}
