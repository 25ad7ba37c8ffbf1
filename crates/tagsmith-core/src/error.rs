use thiserror::Error;

/// Errors that can occur in tagging and scoring operations.
#[derive(Debug, Error)]
pub enum TagsmithError {
    /// A tag set or sequence that must be non-empty was empty.
    #[error("sequence is empty")]
    EmptySequence,

    /// Two arrays that must be aligned have different lengths.
    #[error("length mismatch in {context}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Which arrays were being compared.
        context: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A tag string that is not part of the tag set.
    #[error("unknown tag: {0:?}")]
    UnknownTag(String),

    /// A tag index outside the tag set.
    #[error("tag index {index} out of range for {size} tags")]
    InvalidTagIndex {
        /// The offending index.
        index: usize,
        /// Number of tags in the set.
        size: usize,
    },

    /// Score matrices with the wrong shape.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Result type alias for tagsmith core operations.
pub type Result<T> = std::result::Result<T, TagsmithError>;
