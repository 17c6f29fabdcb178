//! Error type carried through error channels.
//!
//! Errors in Tether are values: a failed source reports one through
//! [`Observer::error`](crate::Observer::error), a driver swallows it, an action
//! republishes it on its error channel. The type is cheap to clone so the same
//! failure can fan out to several observers.

use std::sync::Arc;

/// Failure reported by a source or synthesized by an action.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// `start()` was called on a one-shot action that never received input.
    #[error("action started without input; call `input` before `start`")]
    MissingInput,
    /// A failure described only by a message.
    #[error("{0}")]
    Message(Arc<str>),
    /// A failure wrapping an arbitrary error value.
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Build an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(Arc::from(message.into()))
    }

    /// Wrap any error value.
    pub fn from_error(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Failed(Arc::new(err))
    }

    /// Whether this is the usage error raised by starting without input.
    #[must_use]
    pub fn is_missing_input(&self) -> bool {
        matches!(self, Self::MissingInput)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::from_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_display() {
        let err = Error::msg("lookup failed");
        assert_eq!(err.to_string(), "lookup failed");
    }

    #[test]
    fn wrapped_error_display() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = Error::from(io);
        assert_eq!(err.to_string(), "timed out");
        assert!(!err.is_missing_input());
    }

    #[test]
    fn missing_input_is_flagged() {
        let err = Error::MissingInput;
        assert!(err.is_missing_input());
        assert!(err.to_string().contains("input"));
    }

    #[test]
    fn clones_share_payload() {
        let err = Error::msg("shared");
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
