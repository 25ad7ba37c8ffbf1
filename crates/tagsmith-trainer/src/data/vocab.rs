//! Vocabularies for feature columns and characters.

use std::collections::HashMap;

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

/// String vocabulary with reserved padding (0) and unknown (1) ids.
#[derive(Debug, Clone)]
pub struct Vocab {
    items: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocab {
    /// Build from items in first-seen order.
    pub fn build<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut vocab = Self {
            items: vec!["<pad>".to_string(), "<unk>".to_string()],
            index: HashMap::new(),
        };
        for item in items {
            if !vocab.index.contains_key(item) {
                let id = vocab.items.len() as u32;
                vocab.index.insert(item.to_string(), id);
                vocab.items.push(item.to_string());
            }
        }
        vocab
    }

    pub fn encode(&self, item: &str) -> u32 {
        self.index.get(item).copied().unwrap_or(UNK_ID)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Character vocabulary for encoding tokens.
#[derive(Debug, Clone)]
pub struct CharVocab {
    char_to_idx: HashMap<char, u32>,
}

impl CharVocab {
    /// Characters outside ASCII map to this id.
    pub const UNKNOWN: u32 = 129;

    pub fn new() -> Self {
        // Reserve 0 for padding, ASCII takes 1..=128
        let char_to_idx = (0u8..128).map(|b| (b as char, b as u32 + 1)).collect();
        Self { char_to_idx }
    }

    /// Encode a token into exactly `width` ids, truncating or padding.
    pub fn encode(&self, token: &str, width: usize) -> Vec<u32> {
        let mut ids: Vec<u32> = token
            .chars()
            .take(width)
            .map(|c| self.char_to_idx.get(&c).copied().unwrap_or(Self::UNKNOWN))
            .collect();
        ids.resize(width, PAD_ID);
        ids
    }

    pub fn vocab_size(&self) -> usize {
        130 // padding + ASCII + unknown
    }
}

impl Default for CharVocab {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab() {
        let vocab = Vocab::build(["NNP", "VBZ", "NNP"]);
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.encode("NNP"), 2);
        assert_eq!(vocab.encode("VBZ"), 3);
        assert_eq!(vocab.encode("XX"), UNK_ID);
    }

    #[test]
    fn test_char_vocab() {
        let vocab = CharVocab::new();
        let encoded = vocab.encode("Hé", 4);
        assert_eq!(encoded, vec!['H' as u32 + 1, CharVocab::UNKNOWN, PAD_ID, PAD_ID]);
        assert_eq!(vocab.encode("abcdef", 3).len(), 3);
        assert_eq!(vocab.vocab_size(), 130);
    }
}
