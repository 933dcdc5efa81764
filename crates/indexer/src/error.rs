//! Error taxonomy for event handling.

use scorer_core::DecodeError;
use thiserror::Error;

/// Failure while applying one event.
///
/// Skippable conditions (arity shortfall, unresolved references) are not
/// errors; they surface as [`crate::handlers::Outcome::Skipped`].
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Payload does not have the shape the handler requires.
    #[error(transparent)]
    Malformed(#[from] DecodeError),

    /// The entity store failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl HandlerError {
    /// Whether the payload, rather than the store, is at fault.
    pub fn is_malformed(&self) -> bool {
        matches!(self, HandlerError::Malformed(_))
    }
}

/// Result type alias for HandlerError.
pub type Result<T> = std::result::Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_survives_anyhow_roundtrip() {
        let err: anyhow::Error = HandlerError::from(DecodeError::malformed("short")).into();
        let handler_err = err.downcast_ref::<HandlerError>().unwrap();
        assert!(handler_err.is_malformed());
        assert_eq!(handler_err.to_string(), "Malformed payload: short");

        let store = HandlerError::from(anyhow::anyhow!("disk full"));
        assert!(!store.is_malformed());
        assert_eq!(store.to_string(), "disk full");
    }
}
