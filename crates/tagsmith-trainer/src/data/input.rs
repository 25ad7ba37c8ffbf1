//! Encoded, padded and optionally shuffled datasets.

use anyhow::{Context, Result};
use oorandom::Rand64;
use tagsmith_core::{TagScheme, TagSet};
use tracing::debug;

use super::conll::Sentence;
use super::embvec::EmbVec;
use super::vocab::{CharVocab, Vocab, PAD_ID};
use super::{Batch, ContextualInputs, DataSource};

/// Everything needed to turn sentences into ids.
#[derive(Debug, Clone)]
pub struct Vocabularies {
    pub words: EmbVec,
    pub chars: CharVocab,
    pub pos: Vocab,
    pub chunks: Vocab,
    pub tags: TagSet,
    /// Case-sensitive training vocabulary for the contextual channel.
    pub contextual: Option<Vocab>,
}

impl Vocabularies {
    /// Build vocabularies. Features come from the training sentences only;
    /// the tag set also covers `extra` (typically the dev split) so that
    /// every gold label is encodable. `O` is always tag 0 when present and
    /// other tags keep first-seen order. The chunk scheme is detected from
    /// all tag sequences.
    pub fn build(train: &[Sentence], extra: &[Sentence], words: EmbVec, contextual: bool) -> Result<Self> {
        let sentences = || train.iter().chain(extra);
        let mut labels: Vec<&str> = Vec::new();
        for tag in sentences().flat_map(|s| s.tags.iter()) {
            if !labels.contains(&tag.as_str()) {
                labels.push(tag.as_str());
            }
        }
        if let Some(pos) = labels.iter().position(|&t| t == "O") {
            let outside = labels.remove(pos);
            labels.insert(0, outside);
        }
        let sequences: Vec<Vec<&str>> = sentences()
            .map(|s| s.tags.iter().map(String::as_str).collect())
            .collect();
        let scheme = TagScheme::detect(&sequences);
        let tags = TagSet::new(labels)
            .context("building tag set")?
            .with_scheme(scheme);
        debug!(tags = tags.len(), ?scheme, "tag set built");

        let contextual = contextual
            .then(|| Vocab::build(train.iter().flat_map(|s| s.words.iter().map(String::as_str))));

        Ok(Self {
            words,
            chars: CharVocab::new(),
            pos: Vocab::build(train.iter().flat_map(|s| s.pos.iter().map(String::as_str))),
            chunks: Vocab::build(train.iter().flat_map(|s| s.chunks.iter().map(String::as_str))),
            tags,
            contextual,
        })
    }
}

#[derive(Debug, Clone)]
pub struct InputOptions {
    pub batch_size: usize,
    /// Characters kept per word.
    pub word_length: usize,
    pub shuffle: bool,
    pub seed: u64,
}

#[derive(Debug, Clone)]
struct Encoded {
    word_ids: Vec<u32>,
    char_ids: Vec<Vec<u32>>,
    pos_ids: Vec<u32>,
    chk_ids: Vec<u32>,
    tag_ids: Vec<u32>,
    contextual_ids: Option<Vec<u32>>,
}

/// In-memory dataset implementing [`DataSource`].
#[derive(Debug)]
pub struct Input {
    examples: Vec<Encoded>,
    options: InputOptions,
    max_sentence_length: usize,
    order: Vec<usize>,
    cursor: usize,
    passes: u64,
}

impl Input {
    pub fn new(sentences: &[Sentence], vocabs: &Vocabularies, options: InputOptions) -> Result<Self> {
        if options.batch_size == 0 {
            anyhow::bail!("batch size must be positive");
        }

        let examples = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| encode(s, vocabs, options.word_length).with_context(|| format!("sentence {i}")))
            .collect::<Result<Vec<_>>>()?;
        let max_sentence_length = examples.iter().map(|e| e.word_ids.len()).max().unwrap_or(0);
        debug!(
            examples = examples.len(),
            max_sentence_length,
            batch_size = options.batch_size,
            "input data encoded"
        );

        Ok(Self {
            order: (0..examples.len()).collect(),
            examples,
            options,
            max_sentence_length,
            cursor: 0,
            passes: 0,
        })
    }

    pub fn num_examples(&self) -> usize {
        self.examples.len()
    }

    pub fn max_sentence_length(&self) -> usize {
        self.max_sentence_length
    }

    fn shuffle(&mut self) {
        let mut rng = Rand64::new(((self.options.seed as u128) << 64) | self.passes as u128);
        for i in (1..self.order.len()).rev() {
            let j = rng.rand_range(0..(i as u64 + 1)) as usize;
            self.order.swap(i, j);
        }
    }
}

impl DataSource for Input {
    fn num_batches(&self) -> usize {
        self.examples.len().div_ceil(self.options.batch_size)
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        self.order = (0..self.examples.len()).collect();
        if self.options.shuffle {
            self.shuffle();
        }
        self.passes += 1;
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.cursor >= self.order.len() {
            return Ok(None);
        }

        let end = (self.cursor + self.options.batch_size).min(self.order.len());
        let picked: Vec<&Encoded> = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.examples[i])
            .collect();
        self.cursor = end;

        let width = self.max_sentence_length;
        let pad = |row: &[u32]| {
            let mut row = row.to_vec();
            row.resize(width, PAD_ID);
            row
        };

        let contextual = picked[0].contextual_ids.is_some().then(|| ContextualInputs {
            token_ids: picked
                .iter()
                .map(|e| pad(e.contextual_ids.as_deref().unwrap_or_default()))
                .collect(),
            token_masks: picked.iter().map(|e| pad(&vec![1; e.word_ids.len()])).collect(),
            segment_ids: picked.iter().map(|_| vec![0; width]).collect(),
        });

        Ok(Some(Batch {
            word_ids: picked.iter().map(|e| pad(&e.word_ids)).collect(),
            char_ids: picked
                .iter()
                .map(|e| {
                    let mut rows = e.char_ids.clone();
                    rows.resize(width, vec![PAD_ID; self.options.word_length]);
                    rows
                })
                .collect(),
            pos_ids: picked.iter().map(|e| pad(&e.pos_ids)).collect(),
            chk_ids: picked.iter().map(|e| pad(&e.chk_ids)).collect(),
            contextual,
            tags: picked.iter().map(|e| pad(&e.tag_ids)).collect(),
            lengths: picked.iter().map(|e| e.word_ids.len()).collect(),
            max_sentence_length: width,
        }))
    }
}

fn encode(sentence: &Sentence, vocabs: &Vocabularies, word_length: usize) -> Result<Encoded> {
    let tag_ids = sentence
        .tags
        .iter()
        .map(|t| vocabs.tags.index_of(t).map(|i| i as u32))
        .collect::<tagsmith_core::Result<Vec<_>>>()?;

    Ok(Encoded {
        word_ids: sentence.words.iter().map(|w| vocabs.words.word_id(w)).collect(),
        char_ids: sentence
            .words
            .iter()
            .map(|w| vocabs.chars.encode(w, word_length))
            .collect(),
        pos_ids: sentence.pos.iter().map(|p| vocabs.pos.encode(p)).collect(),
        chk_ids: sentence.chunks.iter().map(|c| vocabs.chunks.encode(c)).collect(),
        tag_ids,
        contextual_ids: vocabs
            .contextual
            .as_ref()
            .map(|v| sentence.words.iter().map(|w| v.encode(w)).collect()),
    })
}
