//! Error types for the point-cloud data model.

use thiserror::Error;

/// Result type for data-model operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors raised when a cloud or transform violates its structural invariants.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Descriptor matrix has a different column count than the feature matrix.
    #[error("descriptor columns ({descriptors}) do not match feature columns ({features})")]
    ColumnMismatch {
        /// Number of feature columns (points).
        features: usize,
        /// Number of descriptor columns.
        descriptors: usize,
    },

    /// Label spans do not cover the matrix rows exactly.
    #[error("label spans cover {labelled} rows but the matrix has {rows}")]
    LabelSpanMismatch {
        /// Total rows claimed by the labels.
        labelled: usize,
        /// Actual matrix row count.
        rows: usize,
    },

    /// A label is malformed (empty name or zero span).
    #[error("invalid label `{text}`: {reason}")]
    InvalidLabel {
        /// The offending label name.
        text: String,
        /// Why the label was rejected.
        reason: String,
    },

    /// A transform matrix is not square with a homogeneous bottom row.
    #[error("transform must be square with bottom row [0 .. 0 1], got {rows}x{cols}")]
    NotHomogeneous {
        /// Row count of the rejected matrix.
        rows: usize,
        /// Column count of the rejected matrix.
        cols: usize,
    },

    /// The point dimension is not supported by the registration stack.
    #[error("unsupported point dimension {dim}, expected 2 or 3")]
    UnsupportedDimension {
        /// The rejected dimension.
        dim: usize,
    },
}
