//! Error handling for plctrend-rs
//!
//! This module defines the error taxonomy of the acquisition engine and a
//! Result alias for use throughout the crate.
//!
//! Only some of these ever reach the shell. Per-tag read failures are
//! recorded as sample quality and address-not-found conditions stay inside
//! the discovery engine.

use crate::types::Timestamp;
use thiserror::Error;

/// Main error type for plctrend-rs operations
#[derive(Error, Debug)]
pub enum TrendError {
    /// The device or transport could not be reached
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// An address does not exist on the device (discovery-internal)
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    /// Rejected configuration (interval, empty selection, duplicate names)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The session cannot perform the requested operation in its current mode
    #[error("Cannot {action} while {mode}")]
    InvalidTransition {
        action: &'static str,
        mode: &'static str,
    },

    /// A single tag failed to read within an otherwise healthy cycle
    #[error("Read of '{tag}' failed at {timestamp}: {message}")]
    Sample {
        tag: String,
        timestamp: Timestamp,
        message: String,
    },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TrendError>,
    },
}

impl TrendError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TrendError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) is a connectivity failure
    pub fn is_connectivity(&self) -> bool {
        match self {
            TrendError::Connectivity(_) => true,
            TrendError::WithContext { source, .. } => source.is_connectivity(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for TrendError {
    fn from(err: serde_json::Error) -> Self {
        TrendError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for TrendError {
    fn from(err: csv::Error) -> Self {
        TrendError::Serialization(err.to_string())
    }
}

/// Result type alias for plctrend-rs operations
pub type Result<T> = std::result::Result<T, TrendError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
