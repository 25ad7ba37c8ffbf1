//! Chunk-level (span) precision, recall and F1, conlleval style.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{f1_score, ratio};
use crate::error::{Result, TagsmithError};
use crate::tags::{Entity, Prefix, Tag};

/// Chunk scores, overall and per entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub per_type: BTreeMap<String, (f64, f64, f64)>,
}

fn ends_chunk(prev: &Tag, curr: &Tag) -> bool {
    match prev.prefix {
        Prefix::End | Prefix::Single => true,
        Prefix::Begin | Prefix::Inside
            if matches!(curr.prefix, Prefix::Begin | Prefix::Single | Prefix::Outside) =>
        {
            true
        }
        Prefix::Outside => false,
        _ => prev.entity != curr.entity,
    }
}

fn starts_chunk(prev: &Tag, curr: &Tag) -> bool {
    match curr.prefix {
        Prefix::Begin | Prefix::Single => true,
        Prefix::Outside => false,
        Prefix::Inside | Prefix::End => {
            matches!(prev.prefix, Prefix::End | Prefix::Single | Prefix::Outside)
                || prev.entity != curr.entity
        }
    }
}

/// Extract labelled spans from a tag sequence.
///
/// A dangling `I-X` after `O` opens a new chunk, as conlleval does.
pub fn extract_entities<S: AsRef<str>>(tags: &[S]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut prev = Tag::outside();
    let mut open: Option<(String, usize)> = None;

    for (i, raw) in tags.iter().enumerate() {
        let curr = Tag::parse(raw.as_ref());

        if open.is_some() && ends_chunk(&prev, &curr) {
            if let Some((entity_type, start)) = open.take() {
                entities.push(Entity {
                    entity_type,
                    start_token: start,
                    end_token: i,
                });
            }
        }
        if starts_chunk(&prev, &curr) {
            if let Some(entity_type) = curr.entity_type() {
                open = Some((entity_type.to_string(), i));
            }
        }
        prev = curr;
    }

    if let Some((entity_type, start)) = open {
        entities.push(Entity {
            entity_type,
            start_token: start,
            end_token: tags.len(),
        });
    }

    entities
}

/// Score predicted tag sequences against gold sequences.
pub fn chunk_f1<S: AsRef<str>>(predicted: &[Vec<S>], gold: &[Vec<S>]) -> Result<ChunkScores> {
    if predicted.len() != gold.len() {
        return Err(TagsmithError::LengthMismatch {
            context: "chunk_f1 sentences",
            expected: gold.len(),
            actual: predicted.len(),
        });
    }

    // entity type -> (correct, predicted, gold)
    let mut counts: BTreeMap<String, (usize, usize, usize)> = BTreeMap::new();

    for (pred_seq, gold_seq) in predicted.iter().zip(gold) {
        if pred_seq.len() != gold_seq.len() {
            return Err(TagsmithError::LengthMismatch {
                context: "chunk_f1 tokens",
                expected: gold_seq.len(),
                actual: pred_seq.len(),
            });
        }

        let pred_chunks = extract_entities(pred_seq);
        let gold_chunks: HashSet<Entity> = extract_entities(gold_seq).into_iter().collect();

        for chunk in &gold_chunks {
            counts.entry(chunk.entity_type.clone()).or_default().2 += 1;
        }
        for chunk in &pred_chunks {
            let entry = counts.entry(chunk.entity_type.clone()).or_default();
            entry.1 += 1;
            if gold_chunks.contains(chunk) {
                entry.0 += 1;
            }
        }
    }

    let (correct, found_pred, found_gold) = counts
        .values()
        .fold((0, 0, 0), |acc, c| (acc.0 + c.0, acc.1 + c.1, acc.2 + c.2));

    let per_type = counts
        .into_iter()
        .map(|(entity_type, (c, p, g))| {
            let precision = ratio(c, p);
            let recall = ratio(c, g);
            (entity_type, (precision, recall, f1_score(precision, recall)))
        })
        .collect();

    let precision = ratio(correct, found_pred);
    let recall = ratio(correct, found_gold);
    Ok(ChunkScores {
        precision,
        recall,
        f1: f1_score(precision, recall),
        per_type,
    })
}
