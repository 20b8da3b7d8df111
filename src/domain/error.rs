//! Domain-level error types for rfid-proxy.
//!
//! All errors are typed with `thiserror`. Driver failures are kept in their
//! own enum so the link can tell a transient device problem apart from a
//! configuration or transport problem.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a reader driver session.
///
/// Every variant is transient from the link's point of view: the supervisor
/// reacts to any of them by reconnecting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The port could not be opened (busy, absent, wrong device).
    #[error("port {port} unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// The device did not answer within the call timeout.
    #[error("reader did not answer within {0:?}")]
    Timeout(Duration),

    /// Transport-level read or write failure.
    #[error("reader I/O failure: {0}")]
    Io(String),

    /// The device answered but refused the command.
    #[error("reader rejected command: {0}")]
    Rejected(String),

    /// The session has been closed or the cable is gone.
    #[error("reader not connected")]
    NotConnected,

    /// The requested logical source does not exist on the device.
    #[error("unknown logical source: {0}")]
    UnknownSource(String),
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A driver call against the live session failed.
    #[error("Reader {operation} failed: {source}")]
    Driver {
        operation: &'static str,
        #[source]
        source: DriverError,
    },

    /// The link is not live; the supervisor will reconnect on its own.
    #[error("Reader link is down")]
    LinkDown,

    /// The link was torn down and will not come back.
    #[error("Reader link is shut down")]
    ShutDown,

    /// No port hosted a responsive reader.
    #[error("No reader found (tried {tried} port(s))")]
    NoReader { tried: usize },

    /// HTTP transport failure.
    #[error("Transport error: {message}")]
    Transport { message: String },
}

impl AppError {
    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Wrap a driver failure with the name of the failing operation.
    #[must_use]
    pub const fn driver(operation: &'static str, source: DriverError) -> Self {
        Self::Driver { operation, source }
    }

    /// Whether the error means the link is (or just became) unusable.
    #[must_use]
    pub const fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::Driver { .. } | Self::LinkDown | Self::ShutDown | Self::NoReader { .. }
        )
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_message_names_operation() {
        let err = AppError::driver("inventory", DriverError::NotConnected);
        assert_eq!(err.to_string(), "Reader inventory failed: reader not connected");
        assert!(err.is_link_failure());
    }

    #[test]
    fn test_config_error_is_not_link_failure() {
        let err = AppError::Config {
            message: "bad".into(),
        };
        assert!(!err.is_link_failure());
    }
}
