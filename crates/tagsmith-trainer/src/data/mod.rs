//! Data loading and batching for sequence-labeling training.

pub mod conll;
pub mod embvec;
pub mod input;
pub mod vocab;

use anyhow::Result;

pub use conll::{load_conll, parse_conll, Sentence};
pub use embvec::EmbVec;
pub use input::{Input, InputOptions, Vocabularies};
pub use vocab::{CharVocab, Vocab};

/// Optional contextual-embedding channel, aligned with word positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextualInputs {
    pub token_ids: Vec<Vec<u32>>,
    pub token_masks: Vec<Vec<u32>>,
    pub segment_ids: Vec<Vec<u32>>,
}

/// One padded minibatch. Every `[b][L]` array has `L == max_sentence_length`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub word_ids: Vec<Vec<u32>>,
    pub char_ids: Vec<Vec<Vec<u32>>>,
    pub pos_ids: Vec<Vec<u32>>,
    pub chk_ids: Vec<Vec<u32>>,
    pub contextual: Option<ContextualInputs>,
    /// Gold tag indices.
    pub tags: Vec<Vec<u32>>,
    /// True (unpadded) length of each example.
    pub lengths: Vec<usize>,
    pub max_sentence_length: usize,
}

impl Batch {
    /// Number of examples in the batch.
    pub fn size(&self) -> usize {
        self.lengths.len()
    }

    /// Total number of real (unpadded) positions.
    pub fn token_count(&self) -> usize {
        self.lengths.iter().sum()
    }
}

/// A restartable, bounded sequence of batches.
pub trait DataSource {
    /// Planned number of batches per pass.
    fn num_batches(&self) -> usize;

    /// Rewind to the start of a fresh pass.
    fn reset(&mut self) -> Result<()>;

    /// Next batch, or `None` once the pass is exhausted.
    fn next_batch(&mut self) -> Result<Option<Batch>>;
}
