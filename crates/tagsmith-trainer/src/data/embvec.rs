//! Pretrained word embeddings in GloVe text format.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::vocab::{PAD_ID, UNK_ID};

/// Word vocabulary plus a dense `[vocab_size, dim]` embedding matrix.
///
/// Row 0 is padding and row 1 is the unknown word; both are zero vectors.
/// Lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct EmbVec {
    dim: usize,
    word_to_id: HashMap<String, u32>,
    vectors: Vec<f32>,
}

impl EmbVec {
    /// Load `word v1 ... vD` lines. Every vector must have `dim` values.
    pub fn load<P: AsRef<Path>>(path: P, dim: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let emb = Self::from_reader(BufReader::new(file), dim)
            .with_context(|| format!("reading embeddings from {}", path.display()))?;
        debug!(words = emb.num_words(), dim, "loaded word embeddings");
        Ok(emb)
    }

    pub fn from_reader<R: BufRead>(reader: R, dim: usize) -> Result<Self> {
        if dim == 0 {
            anyhow::bail!("embedding dimension must be positive");
        }

        let mut word_to_id = HashMap::new();
        let mut vectors = vec![0.0f32; 2 * dim];

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };

            let values = parts
                .map(str::parse::<f32>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("line {}: bad float", lineno + 1))?;
            if values.len() != dim {
                anyhow::bail!(
                    "line {}: expected {} values for {:?}, got {}",
                    lineno + 1,
                    dim,
                    word,
                    values.len()
                );
            }

            let key = word.to_lowercase();
            if word_to_id.contains_key(&key) {
                warn!(word = %key, "duplicate embedding entry ignored");
                continue;
            }
            let id = (vectors.len() / dim) as u32;
            word_to_id.insert(key, id);
            vectors.extend(values);
        }

        Ok(Self {
            dim,
            word_to_id,
            vectors,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of matrix rows, including padding and unknown.
    pub fn vocab_size(&self) -> usize {
        self.vectors.len() / self.dim
    }

    /// Number of words loaded from the file.
    pub fn num_words(&self) -> usize {
        self.word_to_id.len()
    }

    pub fn word_id(&self, word: &str) -> u32 {
        if word.is_empty() {
            return PAD_ID;
        }
        self.word_to_id
            .get(&word.to_lowercase())
            .copied()
            .unwrap_or(UNK_ID)
    }

    /// Flat row-major embedding matrix.
    pub fn matrix(&self) -> &[f32] {
        &self.vectors
    }
}
