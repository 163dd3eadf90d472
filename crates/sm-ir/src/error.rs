//! Model error type.

use thiserror::Error;

/// Errors from session, catalogue and take-list lookups.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelError {
    /// Track handle does not refer to a live track
    #[error("unknown track")]
    UnknownTrack,

    /// Preset id is not in the catalogue
    #[error("unknown instrument preset")]
    UnknownPreset,

    /// Take id is not in the take list
    #[error("unknown take")]
    UnknownTake,
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
