//! Command-line arguments and the resolved training configuration.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Train a sequence labeler with early stopping
#[derive(Parser, Debug, Clone)]
#[command(name = "train")]
#[command(about = "Train a sequence labeler with early stopping and best-model checkpointing")]
#[command(version)]
pub struct Args {
    /// GloVe-format embedding file
    #[arg(long, env = "TAGSMITH_EMB_PATH")]
    pub emb_path: PathBuf,

    /// Word embedding dimension
    #[arg(long, env = "TAGSMITH_WRD_DIM")]
    pub wrd_dim: usize,

    /// Characters kept per word
    #[arg(long, env = "TAGSMITH_WORD_LENGTH", default_value_t = 15)]
    pub word_length: usize,

    #[arg(long, env = "TAGSMITH_BATCH_SIZE", default_value_t = 128)]
    pub batch_size: usize,

    /// Maximum number of epochs
    #[arg(long, env = "TAGSMITH_EPOCH", default_value_t = 50)]
    pub epoch: usize,

    #[arg(long, env = "TAGSMITH_CHECKPOINT_DIR", default_value = "./checkpoint")]
    pub checkpoint_dir: PathBuf,

    /// Weights to restore before training
    #[arg(long, env = "TAGSMITH_RESTORE")]
    pub restore: Option<PathBuf>,

    /// Root directory for summary event files
    #[arg(long, env = "TAGSMITH_SUMMARY_DIR", default_value = "./runs")]
    pub summary_dir: PathBuf,

    #[arg(long, env = "TAGSMITH_TRAIN_FILE", default_value = "data/train.txt")]
    pub train_file: PathBuf,

    #[arg(long, env = "TAGSMITH_DEV_FILE", default_value = "data/dev.txt")]
    pub dev_file: PathBuf,

    /// Non-improving epochs tolerated before stopping
    #[arg(long, env = "TAGSMITH_PATIENCE", default_value_t = 10)]
    pub patience: usize,

    #[arg(long, env = "TAGSMITH_LEARNING_RATE", default_value_t = 0.001)]
    pub learning_rate: f64,

    #[arg(long, env = "TAGSMITH_WARMUP_EPOCHS", default_value_t = 0)]
    pub warmup_epochs: usize,

    /// Enable the contextual embedding channel
    #[arg(long, env = "TAGSMITH_CONTEXTUAL")]
    pub contextual: bool,

    /// Seed for shuffling
    #[arg(long, env = "TAGSMITH_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Log at DEBUG level
    #[arg(short, long, env = "TAGSMITH_VERBOSE")]
    pub verbose: bool,
}

/// Resolved configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub emb_path: PathBuf,
    pub wrd_dim: usize,
    pub word_length: usize,
    pub batch_size: usize,
    pub epoch: usize,
    pub checkpoint_dir: PathBuf,
    pub restore: Option<PathBuf>,
    pub summary_dir: PathBuf,
    pub train_file: PathBuf,
    pub dev_file: PathBuf,
    pub patience: usize,
    pub learning_rate: f64,
    pub warmup_epochs: usize,
    pub contextual: bool,
    pub seed: u64,
    /// Filled in by [`TrainConfig::derive_steps`].
    #[serde(default)]
    pub num_train_steps: usize,
    #[serde(default)]
    pub num_warmup_steps: usize,
}

impl From<Args> for TrainConfig {
    fn from(a: Args) -> Self {
        Self {
            emb_path: a.emb_path,
            wrd_dim: a.wrd_dim,
            word_length: a.word_length,
            batch_size: a.batch_size,
            epoch: a.epoch,
            checkpoint_dir: a.checkpoint_dir,
            restore: a.restore,
            summary_dir: a.summary_dir,
            train_file: a.train_file,
            dev_file: a.dev_file,
            patience: a.patience,
            learning_rate: a.learning_rate,
            warmup_epochs: a.warmup_epochs,
            contextual: a.contextual,
            seed: a.seed,
            num_train_steps: 0,
            num_warmup_steps: 0,
        }
    }
}

impl TrainConfig {
    /// Compute schedule lengths from the number of training examples.
    ///
    /// Multiplies before dividing so a partial final batch still counts
    /// across epochs.
    pub fn derive_steps(&mut self, num_examples: usize) {
        let batch_size = self.batch_size.max(1);
        self.num_train_steps = (num_examples * self.epoch / batch_size).max(1);
        self.num_warmup_steps = (self.warmup_epochs * num_examples / batch_size).max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> TrainConfig {
        let mut argv = vec!["train", "--emb-path", "glove.txt", "--wrd-dim", "50"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap().into()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.wrd_dim, 50);
        assert_eq!(config.word_length, 15);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.epoch, 50);
        assert_eq!(config.patience, 10);
        assert_eq!(config.checkpoint_dir, PathBuf::from("./checkpoint"));
        assert_eq!(config.restore, None);
        assert!(!config.contextual);
    }

    #[test]
    fn test_required_flags() {
        assert!(Args::try_parse_from(["train", "--wrd-dim", "50"]).is_err());
        assert!(Args::try_parse_from(["train", "--emb-path", "e.txt"]).is_err());
    }

    #[test]
    fn test_derive_steps() {
        let mut config = parse(&["--batch-size", "10", "--epoch", "3", "--warmup-epochs", "2"]);
        config.derive_steps(105);
        assert_eq!(config.num_train_steps, 31);
        assert_eq!(config.num_warmup_steps, 21);

        let mut tiny = parse(&["--batch-size", "10"]);
        tiny.derive_steps(3);
        assert_eq!((tiny.num_train_steps, tiny.num_warmup_steps), (1, 1));
    }
}
