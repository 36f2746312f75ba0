//! Error types for compressed array operations.

use thiserror::Error;

/// Error type for array, view and handle operations.
///
/// Every variant is reported to the immediate caller of the failing
/// operation. None of them is retried internally.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// A coordinate component is negative or not below its extent.
    #[error("coordinate {coord:?} out of range for shape {shape:?}")]
    OutOfRange { coord: Vec<isize>, shape: Vec<usize> },

    /// A linear position (pointer or iterator) lies outside `[0, size)`.
    #[error("position {position} out of range for {size} elements")]
    PositionOutOfRange { position: isize, size: usize },

    /// A bulk buffer does not hold exactly one value per element.
    #[error("buffer holds {actual} values but the container has {expected} elements")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Zero extent, overflowing element count, or unsupported dimensionality.
    #[error("invalid shape {0:?}: need 1 to 4 extents, each at least 1")]
    InvalidShape(Vec<usize>),

    /// A coordinate or extent slice has the wrong number of components.
    #[error("expected {expected} components, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A view window does not fit inside the referenced container.
    #[error("window offset {offset:?} extents {extents:?} strides {strides:?} does not fit shape {shape:?}")]
    InvalidWindow {
        offset: Vec<usize>,
        extents: Vec<usize>,
        strides: Vec<isize>,
        shape: Vec<usize>,
    },

    /// Rate outside the supported bits-per-element range.
    #[error("rate {0} outside supported range [1, 64] bits per element")]
    InvalidRate(f64),

    /// The codec failed to encode or decode a block, or the stored payload
    /// failed verification.
    #[error("codec failure on block {block}: {source:#}")]
    Codec {
        block: usize,
        #[source]
        source: anyhow::Error,
    },
}

/// Result type for compressed array operations.
pub type Result<T> = std::result::Result<T, ArrayError>;
