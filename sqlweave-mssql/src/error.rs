//! Error types for Microsoft SQL Server operations.

use sqlweave_core::DialectError;
use thiserror::Error;

/// Result type for MSSQL operations.
pub type MssqlResult<T> = Result<T, MssqlError>;

/// Errors that can occur while talking to SQL Server.
#[derive(Error, Debug)]
pub enum MssqlError {
    /// Tiberius/SQL Server error.
    #[error("sql server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// Socket error while opening the connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("query error: {0}")]
    Query(String),

    /// Type conversion error.
    #[error("type conversion error: {0}")]
    TypeConversion(String),
}

impl MssqlError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Create a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }
}

impl From<MssqlError> for DialectError {
    fn from(err: MssqlError) -> Self {
        match err {
            MssqlError::Config(msg) => DialectError::config(msg),
            MssqlError::TypeConversion(msg) => DialectError::conversion(msg),
            MssqlError::SqlServer(e) => DialectError::driver(e.to_string()),
            MssqlError::Io(e) => DialectError::driver(e.to_string()),
            MssqlError::Connection(msg) | MssqlError::Query(msg) => DialectError::driver(msg),
        }
    }
}
