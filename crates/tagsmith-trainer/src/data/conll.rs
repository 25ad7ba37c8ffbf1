//! Loading of CoNLL-style column files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

/// Placeholder for missing POS / chunk columns.
pub const NO_FEATURE: &str = "<none>";

/// A single labelled sentence with its aligned feature columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    pub words: Vec<String>,
    pub pos: Vec<String>,
    pub chunks: Vec<String>,
    pub tags: Vec<String>,
}

impl Sentence {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn push(&mut self, columns: &[&str]) {
        let (pos, chunk) = if columns.len() >= 4 {
            (columns[1], columns[2])
        } else {
            (NO_FEATURE, NO_FEATURE)
        };
        self.words.push(columns[0].to_string());
        self.pos.push(pos.to_string());
        self.chunks.push(chunk.to_string());
        self.tags.push(columns[columns.len() - 1].to_string());
    }
}

/// Load a dataset in CoNLL column format.
///
/// One token per line, columns separated by whitespace: `word pos chunk tag`
/// (or just `word tag`). Blank lines end a sentence; `-DOCSTART-` and `#`
/// lines are skipped.
pub fn load_conll<P: AsRef<Path>>(path: P) -> Result<Vec<Sentence>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_conll(BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))
}

/// Parse CoNLL column data from any reader.
pub fn parse_conll<R: BufRead>(reader: R) -> Result<Vec<Sentence>> {
    let mut sentences = Vec::new();
    let mut current = Sentence::default();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }

        if line.starts_with("-DOCSTART-") || line.starts_with('#') {
            continue;
        }

        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 2 {
            anyhow::bail!("line {}: expected at least 2 columns, got {:?}", lineno + 1, line);
        }
        current.push(&columns);
    }

    // Don't forget the last sentence
    if !current.is_empty() {
        sentences.push(current);
    }

    Ok(sentences)
}
