//! Error types for Solidafy Load
//!
//! This module defines the error hierarchy for the load pipeline and the
//! checkpoint statistics engine. All public APIs return `Result<T, Error>`
//! where Error is defined here.
//!
//! Stats-store lookups never fail: unknown streams and partitions resolve to
//! zero, so there is no "not found" variant for them.

use thiserror::Error;

/// The main error type for Solidafy Load
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Resource Errors
    // ============================================================================
    #[error("Memory reservation of {requested} bytes cannot be satisfied ({available} bytes available)")]
    ResourceExhausted { requested: u64, available: u64 },

    // ============================================================================
    // Queue Errors
    // ============================================================================
    #[error("Queue partition {partition} is closed")]
    QueueClosed { partition: usize },

    #[error("Queue partition {partition} out of range (queue has {num_partitions} partitions)")]
    PartitionOutOfRange {
        partition: usize,
        num_partitions: usize,
    },

    // ============================================================================
    // Pipeline Errors
    // ============================================================================
    #[error("Step '{step}' failed on partition {partition} (stream {stream}): {message}")]
    Accumulation {
        step: String,
        partition: usize,
        stream: String,
        message: String,
    },

    #[error("Pipeline worker panicked or was cancelled: {message}")]
    Worker { message: String },

    #[error("Internal consistency error: {message}")]
    Internal { message: String },

    // ============================================================================
    // Checkpoint Errors
    // ============================================================================
    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an accumulation error carrying step/partition/stream context
    pub fn accumulation(
        step: impl Into<String>,
        partition: usize,
        stream: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Accumulation {
            step: step.into(),
            partition,
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create an internal consistency error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Whether this error is the normal signal of an intentionally closed queue
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::QueueClosed { .. })
    }

    /// Whether this error must abort the sync
    pub fn is_fatal(&self) -> bool {
        !self.is_shutdown()
    }
}

/// Result type alias for Solidafy Load
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
