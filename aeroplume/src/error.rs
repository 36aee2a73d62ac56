//! Error types shared across the crate.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A menu entry, species table line or ambient profile line could not be
    /// parsed. The message identifies the offending line.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The stiff chemistry integrator diverged or its step size underflowed.
    #[error("chemistry integration failed in cell ({i}, {j}): {reason}")]
    ChemistryFailed {
        /// Cross-wind cell index.
        i: usize,
        /// Vertical cell index.
        j: usize,
        /// Integrator failure cause.
        reason: String,
    },
    /// A snapshot could not be written. Partial files are left on disk.
    #[error("failed to write snapshot {path}: {source}")]
    SaveFailed {
        /// Path of the snapshot that failed.
        path: String,
        /// Underlying I/O or serialization error.
        #[source]
        source: anyhow::Error,
    },
    /// Two arrays that must share a shape do not.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// The shape required by the operation.
        expected: (usize, usize),
        /// The shape that was passed.
        got: (usize, usize),
    },
    /// Error that does not originate from this crate.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Shorthand for a result with this crate's [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;
