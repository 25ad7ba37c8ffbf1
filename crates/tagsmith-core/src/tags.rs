//! # Tag Sets for Named Entity Recognition
//!
//! Label vocabularies for sequence labeling and the BIO/IOBES prefix
//! scheme used to decode chunks from them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TagsmithError};

/// Chunk prefix of a tag (`B-`, `I-`, `E-`, `S-` or plain `O`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prefix {
    Begin,
    Inside,
    End,
    Single,
    Outside,
}

/// How chunks are encoded in a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagScheme {
    /// Every chunk opens with `B-` (or `S-` under IOBES). `I-X` and `E-X`
    /// only continue an open chunk of type `X`.
    #[default]
    Iob2,
    /// CoNLL-2003 style: `I-X` opens a chunk and `B-X` only separates two
    /// adjacent chunks of the same type.
    Iob1,
}

impl TagScheme {
    /// `Iob1` if any sequence opens a chunk with `I-X`, else `Iob2`.
    pub fn detect<S: AsRef<str>>(sequences: &[Vec<S>]) -> Self {
        for seq in sequences {
            let mut prev = Tag::outside();
            for raw in seq {
                let curr = Tag::parse(raw.as_ref());
                if curr.is_inside() && (prev.is_outside() || prev.entity != curr.entity) {
                    return TagScheme::Iob1;
                }
                prev = curr;
            }
        }
        TagScheme::Iob2
    }

    /// Whether a sequence may start with `tag`.
    pub fn allows_start(self, tag: &Tag) -> bool {
        (self == TagScheme::Iob1 && tag.is_inside()) || tag.is_valid_start()
    }

    /// Whether `to` may follow `from`.
    pub fn allows(self, from: &Tag, to: &Tag) -> bool {
        (self == TagScheme::Iob1 && to.is_inside()) || Tag::is_valid_transition(from, to)
    }
}

/// A parsed tag: prefix plus entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub prefix: Prefix,
    pub entity: Option<String>,
}

impl Tag {
    /// Parse a tag string such as `B-PER`, `I-LOC` or `O`.
    ///
    /// Tags without a recognised prefix (e.g. `DATE`) are treated as
    /// single-token chunks of that type.
    pub fn parse(raw: &str) -> Self {
        if raw == "O" || raw.is_empty() {
            return Self {
                prefix: Prefix::Outside,
                entity: None,
            };
        }

        let (prefix, entity) = match raw.split_once('-') {
            Some(("B", rest)) => (Prefix::Begin, rest),
            Some(("I", rest)) => (Prefix::Inside, rest),
            Some(("E", rest)) => (Prefix::End, rest),
            Some(("S", rest)) => (Prefix::Single, rest),
            _ => (Prefix::Single, raw),
        };

        Self {
            prefix,
            entity: Some(entity.to_string()),
        }
    }

    /// The outside tag.
    pub fn outside() -> Self {
        Self::parse("O")
    }

    /// Check if this is a "Begin" tag.
    pub fn is_begin(&self) -> bool {
        self.prefix == Prefix::Begin
    }

    /// Check if this is an "Inside" tag.
    pub fn is_inside(&self) -> bool {
        self.prefix == Prefix::Inside
    }

    pub fn is_outside(&self) -> bool {
        self.prefix == Prefix::Outside
    }

    /// Get the entity type for this tag.
    pub fn entity_type(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Whether an IOB2/IOBES sequence may start with this tag.
    pub fn is_valid_start(&self) -> bool {
        !matches!(self.prefix, Prefix::Inside | Prefix::End)
    }

    /// Check if transitioning from `from` tag to `to` tag is valid under
    /// IOB2/IOBES.
    ///
    /// `I-X` and `E-X` may only continue a chunk of the same type that is
    /// still open (`B-X` or `I-X`).
    pub fn is_valid_transition(from: &Tag, to: &Tag) -> bool {
        match to.prefix {
            Prefix::Inside | Prefix::End => {
                matches!(from.prefix, Prefix::Begin | Prefix::Inside) && from.entity == to.entity
            }
            _ => true,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = self.entity.as_deref().unwrap_or_default();
        match self.prefix {
            Prefix::Begin => write!(f, "B-{entity}"),
            Prefix::Inside => write!(f, "I-{entity}"),
            Prefix::End => write!(f, "E-{entity}"),
            Prefix::Single => write!(f, "S-{entity}"),
            Prefix::Outside => write!(f, "O"),
        }
    }
}

/// A contiguous labelled span, `start..end` in token indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    pub entity_type: String,
    pub start_token: usize,
    pub end_token: usize,
}

/// Ordered label vocabulary mapping tag strings to class indices.
///
/// Serializes as the plain label list; a deserialized set uses the
/// default [`TagScheme`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet {
    labels: Vec<String>,
    parsed: Vec<Tag>,
    index: HashMap<String, usize>,
    scheme: TagScheme,
}

impl TagSet {
    /// Build a tag set from labels in index order. Duplicates are rejected.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(TagsmithError::EmptySequence);
        }

        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(TagsmithError::UnknownTag(format!("duplicate tag {label}")));
            }
        }
        let parsed = labels.iter().map(|l| Tag::parse(l)).collect();

        Ok(Self {
            labels,
            parsed,
            index,
            scheme: TagScheme::default(),
        })
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: TagScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn scheme(&self) -> TagScheme {
        self.scheme
    }

    /// Total number of distinct tags.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Get the tag index for tensor operations.
    pub fn index_of(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| TagsmithError::UnknownTag(label.to_string()))
    }

    /// Get the tag string from an index.
    pub fn label(&self, idx: usize) -> Result<&str> {
        self.labels
            .get(idx)
            .map(String::as_str)
            .ok_or(TagsmithError::InvalidTagIndex {
                index: idx,
                size: self.labels.len(),
            })
    }

    pub fn tag(&self, idx: usize) -> Option<&Tag> {
        self.parsed.get(idx)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Index of the `O` tag, if the set has one.
    pub fn outside_index(&self) -> Option<usize> {
        self.index.get("O").copied()
    }

    /// `mask[from][to]` is true when the transition is allowed.
    pub fn transition_mask(&self) -> Vec<Vec<bool>> {
        self.parsed
            .iter()
            .map(|from| {
                self.parsed
                    .iter()
                    .map(|to| self.scheme.allows(from, to))
                    .collect()
            })
            .collect()
    }

    /// `mask[tag]` is true when a sequence may start with the tag.
    pub fn start_mask(&self) -> Vec<bool> {
        self.parsed
            .iter()
            .map(|tag| self.scheme.allows_start(tag))
            .collect()
    }

    /// Convert padded index rows into tag strings, truncating each row to
    /// its true length.
    pub fn decode_sequences(
        &self,
        indices: &[Vec<u32>],
        lengths: &[usize],
    ) -> Result<Vec<Vec<String>>> {
        if indices.len() != lengths.len() {
            return Err(TagsmithError::LengthMismatch {
                context: "decode_sequences rows",
                expected: indices.len(),
                actual: lengths.len(),
            });
        }

        indices
            .iter()
            .zip(lengths)
            .map(|(row, &len)| {
                if len > row.len() {
                    return Err(TagsmithError::LengthMismatch {
                        context: "decode_sequences row length",
                        expected: row.len(),
                        actual: len,
                    });
                }
                row[..len]
                    .iter()
                    .map(|&idx| self.label(idx as usize).map(str::to_string))
                    .collect()
            })
            .collect()
    }
}

impl TryFrom<Vec<String>> for TagSet {
    type Error = TagsmithError;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::new(labels)
    }
}

impl From<TagSet> for Vec<String> {
    fn from(set: TagSet) -> Self {
        set.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conll_tags() -> TagSet {
        TagSet::new(["O", "B-PER", "I-PER", "B-LOC", "I-LOC"]).unwrap()
    }

    #[test]
    fn test_tag_parse() {
        let tag = Tag::parse("B-PER");
        assert!(tag.is_begin());
        assert_eq!(tag.entity_type(), Some("PER"));
        assert!(Tag::parse("O").is_outside());
        assert_eq!(Tag::parse("DATE").prefix, Prefix::Single);
        assert_eq!(Tag::parse("I-MISC").to_string(), "I-MISC");
    }

    #[test]
    fn test_valid_transitions() {
        let b_per = Tag::parse("B-PER");
        let i_per = Tag::parse("I-PER");
        let i_loc = Tag::parse("I-LOC");
        let o = Tag::outside();

        assert!(Tag::is_valid_transition(&b_per, &i_per));
        assert!(Tag::is_valid_transition(&o, &b_per));
        assert!(Tag::is_valid_transition(&i_per, &o));
        assert!(!Tag::is_valid_transition(&o, &i_per));
        assert!(!Tag::is_valid_transition(&b_per, &i_loc));
        assert!(!i_per.is_valid_start());
    }

    #[test]
    fn test_tag_set_index_roundtrip() {
        let set = conll_tags();
        for (i, label) in set.labels().iter().enumerate() {
            assert_eq!(set.index_of(label).unwrap(), i);
            assert_eq!(set.label(i).unwrap(), label);
        }
        assert_eq!(set.outside_index(), Some(0));
        assert!(set.index_of("B-ORG").is_err());
        assert!(set.label(99).is_err());
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        assert!(TagSet::new(["O", "O"]).is_err());
        assert!(TagSet::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_transition_mask() {
        let set = conll_tags();
        let mask = set.transition_mask();
        // O -> I-PER forbidden, B-PER -> I-PER allowed
        assert!(!mask[0][2]);
        assert!(mask[1][2]);
        assert!(!mask[1][4]);
        assert_eq!(set.start_mask(), vec![true, true, false, true, false]);
    }

    #[test]
    fn test_detect_scheme() {
        let iob2 = vec![vec!["B-PER", "I-PER", "O", "B-LOC"], vec!["O"]];
        assert_eq!(TagScheme::detect(&iob2), TagScheme::Iob2);

        let iob1 = vec![vec!["O", "I-PER", "I-PER", "B-PER"]];
        assert_eq!(TagScheme::detect(&iob1), TagScheme::Iob1);

        let type_switch = vec![vec!["B-PER", "I-LOC"]];
        assert_eq!(TagScheme::detect(&type_switch), TagScheme::Iob1);
        assert_eq!(TagScheme::detect::<&str>(&[]), TagScheme::Iob2);
    }

    #[test]
    fn test_iob1_masks_allow_opening_inside() {
        let set = TagSet::new(["O", "I-PER", "B-PER", "I-LOC"])
            .unwrap()
            .with_scheme(TagScheme::Iob1);
        let mask = set.transition_mask();
        assert!(mask[0][1]);
        assert!(mask[3][1]);
        assert!(mask[1][2]);
        assert_eq!(set.start_mask(), vec![true, true, true, true]);
        assert_eq!(conll_tags().scheme(), TagScheme::Iob2);
    }

    #[test]
    fn test_decode_sequences_truncates_padding() {
        let set = conll_tags();
        let rows = vec![vec![1, 2, 0, 0], vec![3, 0, 0, 0]];
        let decoded = set.decode_sequences(&rows, &[3, 1]).unwrap();
        assert_eq!(decoded[0], vec!["B-PER", "I-PER", "O"]);
        assert_eq!(decoded[1], vec!["B-LOC"]);

        assert!(set.decode_sequences(&rows, &[5, 1]).is_err());
        assert!(set.decode_sequences(&rows, &[1]).is_err());
    }

    #[test]
    fn test_tag_set_serde() {
        let set = conll_tags();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["O","B-PER","I-PER","B-LOC","I-LOC"]"#);
        let back: TagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 5);
    }
}
