//! Persisting the best model.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::SequenceModel;

pub const WEIGHTS_FILE: &str = "ner_model";
pub const GRAPH_FILE: &str = "graph.pb";
pub const GRAPH_TEXT_FILE: &str = "graph.pb_txt";
pub const RECORD_FILE: &str = "best_model.json";

/// Scores and location of the most recently adopted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestModelRecord {
    pub checkpoint: PathBuf,
    pub epoch: usize,
    pub token_f1: f64,
    pub chunk_f1: f64,
    pub avg_f1: f64,
}

impl BestModelRecord {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Writes weights, graph definitions and the best-model record into a
/// checkpoint directory.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    dir: PathBuf,
}

impl Checkpointer {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_FILE)
    }

    pub fn save(
        &self,
        model: &dyn SequenceModel,
        epoch: usize,
        token_f1: f64,
        chunk_f1: f64,
        avg_f1: f64,
    ) -> Result<BestModelRecord> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating checkpoint dir {}", self.dir.display()))?;

        let weights = self.weights_path();
        model.save_weights(&weights)?;

        let graph = model.graph_def();
        let graph_path = self.dir.join(GRAPH_FILE);
        fs::write(&graph_path, serde_json::to_vec(&graph)?)
            .with_context(|| format!("writing {}", graph_path.display()))?;
        let text_path = self.dir.join(GRAPH_TEXT_FILE);
        fs::write(&text_path, serde_json::to_string_pretty(&graph)?)
            .with_context(|| format!("writing {}", text_path.display()))?;

        let record = BestModelRecord {
            checkpoint: weights,
            epoch,
            token_f1,
            chunk_f1,
            avg_f1,
        };
        let record_path = self.dir.join(RECORD_FILE);
        fs::write(&record_path, serde_json::to_string_pretty(&record)?)
            .with_context(|| format!("writing {}", record_path.display()))?;

        info!(path = %record.checkpoint.display(), epoch, "model saved");
        Ok(record)
    }
}
