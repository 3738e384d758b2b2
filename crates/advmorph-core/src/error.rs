//! Error types for deformation-field operations.

use thiserror::Error;

/// Main error type for deformation-field operations.
#[derive(Error, Debug)]
pub enum MorphError {
    /// A required configuration key is absent.
    #[error("Missing configuration key: {key}")]
    MissingConfig { key: &'static str },

    /// Configuration values are present but inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Tensor rank or channel count does not match a precondition.
    #[error("Shape mismatch: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        expected: String,
        actual: Vec<usize>,
    },

    /// An enumerated option received a value outside its domain.
    #[error("Unsupported value `{value}` for {option}; valid choices: {valid}")]
    UnsupportedOption {
        option: &'static str,
        value: String,
        valid: &'static str,
    },

    /// An operation was called in a lifecycle state that cannot serve it.
    #[error("State violation: {0}")]
    StateViolation(String),
}

/// Result type for deformation-field operations.
pub type Result<T> = std::result::Result<T, MorphError>;

impl MorphError {
    /// Create an invalid-configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a shape-mismatch error.
    pub fn shape_mismatch(expected: impl Into<String>, actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }

    /// Create a state-violation error.
    pub fn state_violation(msg: impl Into<String>) -> Self {
        Self::StateViolation(msg.into())
    }
}
