//! Error types for the core crate.

use thiserror::Error;

use crate::wire::ScType;

/// Decoding error raised by the wire front-ends and typed accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Wire value does not have the expected shape (missing or unknown
    /// discriminant, truncated input, wrong arity, bad encoding).
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A value carried a different type tag than the one requested.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested type.
        expected: ScType,
        /// Type actually carried by the value.
        found: ScType,
    },
}

impl DecodeError {
    /// Shorthand for [`DecodeError::MalformedPayload`].
    pub fn malformed(msg: impl Into<String>) -> Self {
        DecodeError::MalformedPayload(msg.into())
    }

    /// Whether this is a [`DecodeError::TypeMismatch`].
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, DecodeError::TypeMismatch { .. })
    }

    /// Escalate an error on a required field to a malformed payload.
    ///
    /// A wrong tag in a field the event cannot do without means the payload
    /// as a whole has the wrong shape.
    pub fn required(self, field: &str) -> Self {
        match self {
            DecodeError::TypeMismatch { expected, found } => DecodeError::malformed(format!(
                "field '{}': expected {}, found {}",
                field, expected, found
            )),
            other => other,
        }
    }
}

/// Result type alias for DecodeError.
pub type Result<T> = std::result::Result<T, DecodeError>;
