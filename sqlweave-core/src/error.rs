//! Error types shared by every dialect.

use thiserror::Error;

/// Result type for dialect operations.
pub type DialectResult<T> = Result<T, DialectError>;

/// Errors that can occur while a dialect talks to a driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DialectError {
    /// The database URL could not be parsed.
    #[error("invalid database URL: {0}")]
    InvalidUrl(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested isolation level is not known to the dialect.
    #[error("invalid isolation level '{level}', valid levels are: {valid}")]
    InvalidIsolationLevel {
        /// The level name as requested.
        level: String,
        /// Comma separated list of accepted names.
        valid: String,
    },

    /// A result or bind value could not be converted.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Error raised by the underlying driver.
    #[error("driver error: {0}")]
    Driver(String),

    /// Driver error that was classified as a lost connection.
    #[error("connection lost: {0}")]
    Disconnected(String),
}

impl DialectError {
    /// Create an invalid URL error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a conversion error.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Create a disconnect error.
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::Disconnected(message.into())
    }

    /// Check if the connection this error came from must be discarded.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// Check if this error came from the driver, whether or not it was a disconnect.
    pub fn is_driver_error(&self) -> bool {
        matches!(self, Self::Driver(_) | Self::Disconnected(_))
    }

    /// Check if this is a URL or configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidUrl(_) | Self::Config(_))
    }

    /// The message carried by a driver error, if this is one.
    pub fn driver_message(&self) -> Option<&str> {
        match self {
            Self::Driver(msg) | Self::Disconnected(msg) => Some(msg),
            _ => None,
        }
    }
}

impl From<url::ParseError> for DialectError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
