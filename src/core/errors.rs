/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for ring operations
pub type RingResult<T> = Result<T, RingError>;

/// Completion ring errors with serialization support
///
/// Draining the ring never fails; these cover construction of a ring view,
/// the simulated producer and configuration loading.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum RingError {
    #[error("Invalid ring layout: {0}")]
    #[diagnostic(
        code(ring::invalid_layout),
        help("Entries must be a non-zero power of two, mask must be entries - 1 and addresses must be non-null and aligned.")
    )]
    InvalidLayout(String),

    #[error("Completion ring overflow: {pending} of {capacity} entries unconsumed")]
    #[diagnostic(
        code(ring::overflow),
        help("The consumer is not draining fast enough. Call process() before posting more completions.")
    )]
    Overflow { pending: u32, capacity: u32 },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(ring::config),
        help("Check URING_* environment variables and the configuration document.")
    )]
    Config(String),
}

impl From<serde_json::Error> for RingError {
    fn from(err: serde_json::Error) -> Self {
        RingError::Config(err.to_string())
    }
}
