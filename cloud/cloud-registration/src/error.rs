//! Error types for the registration pipeline.

use cloud_types::CloudError;
use thiserror::Error;

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Errors that can occur while running the registration pipeline.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A cloud or transform violated a data-model invariant.
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// Matrix dimensions disagree between pipeline stages.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which quantity disagreed.
        context: &'static str,
        /// Expected extent.
        expected: usize,
        /// Actual extent.
        actual: usize,
    },

    /// A convergence check aborted the iteration because the solution is
    /// running away from any acceptable answer.
    #[error("check `{check}` aborted iteration: {reason}")]
    Diverged {
        /// Name of the check that tripped.
        check: &'static str,
        /// Why iteration was aborted.
        reason: String,
    },

    /// The weighted matched set is insufficient to estimate a transform.
    #[error("degenerate matched set: {0}")]
    Degenerate(String),

    /// A stage requires a named descriptor the cloud does not carry.
    #[error("descriptor `{name}` required by {stage} is missing")]
    MissingDescriptor {
        /// The stage that needed the descriptor.
        stage: &'static str,
        /// The missing descriptor label.
        name: String,
    },

    /// A stage was configured or used incorrectly.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
