//! Error types for ngcs
//!
//! Centralized error handling using thiserror. The variants follow the layers
//! of the protocol: transport, framing/codec, protocol shape, server-reported.

use thiserror::Error;

/// All error types that can occur in ngcs
#[derive(Debug, Error)]
pub enum NgcsError {
    /// Malformed frame, value or struct payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Well-formed response with an unexpected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Failure reported by the daemon through an Error value
    #[error("Server error: {0}")]
    Server(String),

    /// Channel closed while data was still expected
    #[error("Channel {channel} closed (code {code})")]
    ChannelClosed { channel: i32, code: i32 },

    /// Session with the daemon is gone
    #[error("Disconnected from daemon")]
    Disconnected,

    /// Code generator template error
    #[error("Template error at line {line}: {message}")]
    Template { line: usize, message: String },

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NgcsError {
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        NgcsError::Decode(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        NgcsError::Protocol(message.into())
    }

    /// True for errors that end the whole session rather than one command.
    pub fn is_transport(&self) -> bool {
        matches!(self, NgcsError::Io(_) | NgcsError::Disconnected)
    }
}

/// Result type alias for ngcs operations
pub type Result<T> = std::result::Result<T, NgcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error() {
        let err = NgcsError::decode("member length -3");
        assert_eq!(err.to_string(), "Decode error: member length -3");
    }

    #[test]
    fn test_protocol_error() {
        let err = NgcsError::protocol("expected a channel id");
        assert_eq!(err.to_string(), "Protocol error: expected a channel id");
    }

    #[test]
    fn test_channel_closed_error() {
        let err = NgcsError::ChannelClosed { channel: 5, code: -1 };
        assert_eq!(err.to_string(), "Channel 5 closed (code -1)");
    }

    #[test]
    fn test_template_error() {
        let err = NgcsError::Template {
            line: 12,
            message: "unknown field kind".to_string(),
        };
        assert_eq!(err.to_string(), "Template error at line 12: unknown field kind");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "socket not found");
        let err: NgcsError = io_err.into();
        assert!(matches!(err, NgcsError::Io(_)));
        assert!(err.to_string().contains("socket not found"));
        assert!(err.is_transport());
    }

    #[test]
    fn test_is_transport() {
        assert!(NgcsError::Disconnected.is_transport());
        assert!(!NgcsError::decode("bad").is_transport());
        assert!(!NgcsError::Server("nope".into()).is_transport());
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(NgcsError::Disconnected)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
