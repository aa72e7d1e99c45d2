//! Error types for kaos-disruptor.

/// Result type for kaos-disruptor operations.
pub type Result<T> = std::result::Result<T, KaosError>;

/// Error reported by a user callback (event handler, lifecycle hook, poll handler).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Return type of handler callbacks.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Sequencing and coordination errors.
#[derive(Debug, thiserror::Error)]
pub enum KaosError {
    /// Bad construction parameter or claim size.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-blocking claim found the buffer full.
    #[error("insufficient capacity")]
    InsufficientCapacity,

    /// A barrier or sequencer was alerted while the caller was waiting.
    #[error("alerted")]
    Alerted,

    /// A timeout-capable wait strategy gave up before the sequence arrived.
    #[error("timed out waiting for sequence")]
    Timeout,

    /// Operation not valid in the current lifecycle state.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// A processor was halted by its exception handler.
    #[error("event handler failed at sequence {sequence}: {message}")]
    EventHandler { sequence: i64, message: String },

    /// Spawning a processor thread failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KaosError {
    /// Shorthand for [`KaosError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        KaosError::InvalidArgument(msg.into())
    }

    /// True for the cooperative-cancellation signal.
    pub fn is_alert(&self) -> bool {
        matches!(self, KaosError::Alerted)
    }

    /// True for a wait strategy timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, KaosError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            KaosError::invalid("size must be power of 2").to_string(),
            "invalid argument: size must be power of 2"
        );
        assert_eq!(
            KaosError::EventHandler {
                sequence: 7,
                message: "boom".into()
            }
            .to_string(),
            "event handler failed at sequence 7: boom"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(KaosError::Alerted.is_alert());
        assert!(!KaosError::Alerted.is_timeout());
        assert!(KaosError::Timeout.is_timeout());
        assert!(!KaosError::InsufficientCapacity.is_alert());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: KaosError = std::io::Error::new(std::io::ErrorKind::Other, "spawn").into();
        assert!(matches!(err, KaosError::Io(_)));
        assert_eq!(err.to_string(), "io error: spawn");
    }
}
