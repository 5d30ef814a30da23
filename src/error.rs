//! Error types for azure_table_log
//!
//! This module defines all error types used throughout the crate.
//! Configuration and connectivity failures surface from initialization;
//! delivery failures stay inside the background processor and are only
//! observable through diagnostics.

use thiserror::Error;

/// Main error type for azure_table_log operations
#[derive(Error, Debug)]
pub enum TableLogError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigFileMissing(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Table name rejected by the local naming pre-check
    #[error("{0} is not a valid name for Azure storage table name")]
    InvalidTableName(String),

    /// Resolved partition or row key violates the store constraints
    #[error("Invalid {kind} key '{key}': {reason}")]
    InvalidKey {
        kind: &'static str,
        key: String,
        reason: String,
    },

    /// Connection string could not be resolved or parsed
    #[error("Connection string error: {0}")]
    ConnectionString(String),

    /// Initialization errors
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// Store is unreachable or asked us to back off (transient)
    #[error("Table store unavailable: {0}")]
    StoreUnavailable(String),

    /// Store refused the request (permanent)
    #[error("Table store rejected request with status {status}: {message}")]
    StoreRejected { status: u16, message: String },

    /// Channel communication errors
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Shutdown did not finish inside the grace period
    #[error("Shutdown timeout")]
    ShutdownTimeout,

    /// I/O errors
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    /// TOML parsing errors
    #[error("TOML parsing error: {source}")]
    TomlError {
        #[from]
        source: toml::de::Error,
    },

    /// Tracing subscriber errors
    #[error("Tracing error: {0}")]
    TracingError(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for azure_table_log operations
pub type Result<T> = std::result::Result<T, TableLogError>;

impl TableLogError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a new connection string error
    pub fn connection_string<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionString(msg.into())
    }

    /// Create a new transient store error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a new initialization error
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        Self::InitializationError(msg.into())
    }

    /// Create a new channel error
    pub fn channel<S: Into<String>>(msg: S) -> Self {
        Self::ChannelError(msg.into())
    }

    /// Create a new tracing error
    pub fn tracing<S: Into<String>>(msg: S) -> Self {
        Self::TracingError(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Check if this error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) => true,
            Self::IoError { .. } => true,
            Self::ChannelError(_) => true,
            Self::StoreRejected { status, .. } => *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Get the error category for logging purposes
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigError(_)
            | Self::ConfigFileMissing(_)
            | Self::InvalidLogLevel(_)
            | Self::InvalidTableName(_) => "config",
            Self::InvalidKey { .. } => "key",
            Self::ConnectionString(_) => "connection",
            Self::InitializationError(_) => "initialization",
            Self::StoreUnavailable(_) | Self::StoreRejected { .. } => "store",
            Self::ChannelError(_) => "channel",
            Self::ShutdownTimeout => "shutdown",
            Self::IoError { .. } => "io",
            Self::SerializationError { .. } => "serialization",
            Self::TomlError { .. } => "toml",
            Self::TracingError(_) => "tracing",
            Self::InternalError(_) => "internal",
        }
    }
}
