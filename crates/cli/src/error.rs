//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// HTTP listener could not be bound
    #[error("Failed to bind HTTP listener on {addr}: {message}")]
    Bind { addr: String, message: String },

    /// A pipeline task ended abnormally
    #[error("Pipeline task '{task}' failed: {message}")]
    Task { task: &'static str, message: String },

    /// Simulator could not reach the pipeline
    #[error("Ingestion request to {url} failed: {message}")]
    Ingest { url: String, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn bind(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Bind {
            addr: addr.into(),
            message: message.into(),
        }
    }

    pub fn task(task: &'static str, message: impl Into<String>) -> Self {
        Self::Task {
            task,
            message: message.into(),
        }
    }

    pub fn ingest(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingest {
            url: url.into(),
            message: message.into(),
        }
    }
}
