//! The model contract driven by the training loop.

pub mod tagger;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::data::Batch;

pub use tagger::{TaggerConfig, TaggerModel};

/// Whether a step updates parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Train,
    Eval,
}

impl Mode {
    pub fn is_training(self) -> bool {
        self == Mode::Train
    }
}

/// Optional input channels a model consumes, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub contextual: bool,
}

/// Label-index outputs of an eval step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOutputs {
    /// Predicted tag indices, `[b][L]`.
    pub predicted: Vec<Vec<u32>>,
    /// Gold tag indices, `[b][L]`, attached from the batch by the runner.
    pub gold: Vec<Vec<u32>>,
    pub lengths: Vec<usize>,
}

/// Output of one batch execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub global_step: u64,
    pub loss: f64,
    pub accuracy: f64,
    pub f1: f64,
    /// Present in train mode.
    pub learning_rate: Option<f64>,
    /// Present in eval mode.
    pub eval: Option<EvalOutputs>,
}

/// Serializable description of a model's architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
    pub architecture: String,
    pub capabilities: Capabilities,
    pub tags: Vec<String>,
    pub dims: BTreeMap<String, usize>,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A trainable sequence labeler.
pub trait SequenceModel {
    fn capabilities(&self) -> Capabilities;

    /// Run one batch. Train mode applies an optimizer step; eval mode
    /// returns predictions in [`StepResult::eval`].
    fn execute(&mut self, batch: &Batch, mode: Mode) -> Result<StepResult>;

    /// Number of train steps taken so far in this run.
    fn global_step(&self) -> u64;

    fn save_weights(&self, path: &Path) -> Result<()>;

    fn restore(&mut self, path: &Path) -> Result<()>;

    fn graph_def(&self) -> GraphDef;
}
