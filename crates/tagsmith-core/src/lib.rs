//! # Tagsmith Core
//!
//! Building blocks shared by the tagsmith trainer: label vocabularies with
//! BIO/IOBES chunk semantics, constrained Viterbi decoding, and the
//! token-level and chunk-level F1 metrics used to select checkpoints.
//!
//! ## Quick Start
//!
//! ```rust
//! use tagsmith_core::{chunk_f1, TagSet};
//!
//! let tags = TagSet::new(["O", "B-PER", "I-PER"]).unwrap();
//! let gold = tags.decode_sequences(&[vec![1, 2, 0]], &[3]).unwrap();
//! let scores = chunk_f1(&gold, &gold).unwrap();
//!
//! assert_eq!(scores.f1, 1.0);
//! ```
pub mod error;
pub mod metrics;
pub mod tags;
pub mod viterbi;

// Re-export primary API
pub use error::{Result, TagsmithError};
pub use metrics::{chunk_f1, token_f1, ChunkScores, TokenEval, TokenScores};
pub use tags::{Entity, Prefix, Tag, TagScheme, TagSet};
pub use viterbi::ViterbiDecoder;
