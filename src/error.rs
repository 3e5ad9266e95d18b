//! Error types for mse-media.

use thiserror::Error;

/// Result type for mse-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mse-media operations.
///
/// Every variant is recoverable at the append boundary: a failure aborts
/// the current append's decode and leaves previously committed track
/// state intact.
#[derive(Debug, Error)]
pub enum Error {
    /// A read past the declared bounds of a box, element, or buffer.
    #[error("out of bounds: need {need} bytes, have {have}")]
    OutOfBounds { need: u64, have: u64 },

    /// A container's children did not sum to its declared size.
    #[error("size mismatch in '{container}': children consumed {consumed} of {declared} bytes")]
    SizeMismatch {
        container: &'static str,
        consumed: u64,
        declared: u64,
    },

    /// The declared size of a box cannot even cover its own header.
    #[error("invalid box size {size} for '{box_type}'")]
    InvalidBoxSize { box_type: String, size: u64 },

    /// An unknown child under a container that expects a closed set.
    #[error("unsupported box '{child}' in '{container}' container")]
    UnsupportedBox { container: String, child: String },

    /// A box carried a type tag other than the one its position demands.
    #[error("unexpected box type '{found}', expected '{expected}'")]
    UnexpectedBoxType { expected: String, found: String },

    /// A sample field has neither a trun value, a tfhd override, nor a
    /// trex default.
    #[error("missing default for sample {field} on track {track_id}")]
    MissingDefault {
        track_id: u32,
        field: &'static str,
    },

    /// The mdat payload is shorter than the sample run demands.
    #[error("truncated payload: mdat has {have} bytes left, sample needs {need}")]
    TruncatedPayload { need: u64, have: u64 },

    /// An EBML length prefix with no set bit in its allowed width.
    #[error("invalid EBML varint at offset {offset}")]
    InvalidEbmlVarint { offset: usize },
}
