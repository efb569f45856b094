//! Crate-wide error type.

use crate::config::ConfigError;
use crate::repr::TreeValidationError;

/// Errors surfaced by extraction, prediction, emission and checking.
///
/// Every variant signals an integration defect; nothing here is retried.
/// A prediction disagreement is never an error, see [`crate::check::Report`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad codec or configuration parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source model is structurally inconsistent.
    #[error("malformed model: {0}")]
    MalformedModel(String),

    /// A forest without trees.
    #[error("model has no trees")]
    EmptyModel,

    /// Input dimensions disagree with the model.
    #[error("shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TreeValidationError> for Error {
    fn from(e: TreeValidationError) -> Self {
        Error::MalformedModel(e.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}

/// Result alias with [`Error`] as the default error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fail with [`Error::ShapeMismatch`] unless `actual == expected`.
#[inline]
pub(crate) fn ensure_shape(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}
