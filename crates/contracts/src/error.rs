//! Layered error definitions
//!
//! Categorized by source: config / stream / codec / store / subscriber / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Stream Errors =====
    /// Transient fetch failure, the caller retries
    #[error("stream fetch error: {message}")]
    StreamFetch { message: String },

    /// Offset commit failure
    #[error("stream commit error at partition {partition} offset {offset}: {message}")]
    StreamCommit {
        partition: u32,
        offset: u64,
        message: String,
    },

    /// Publish failure on the producer side
    #[error("stream publish error: {message}")]
    StreamPublish { message: String },

    // ===== Codec Errors =====
    /// Malformed stream message
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Encoding failure
    #[error("encode error: {message}")]
    Encode { message: String },

    /// Record violates its invariants
    #[error("invalid record: {message}")]
    InvalidRecord { message: String },

    // ===== Store Errors =====
    /// Durable store failure
    #[error("store '{store}' error: {message}")]
    Store { store: String, message: String },

    /// Store call exceeded its timeout
    #[error("store '{store}' call timed out after {waited_ms}ms")]
    StoreTimeout { store: String, waited_ms: u64 },

    // ===== Subscriber Errors =====
    /// Push to a live subscriber failed
    #[error("subscriber '{peer}' write error: {message}")]
    SubscriberWrite { peer: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create transient stream fetch error
    pub fn stream_fetch(message: impl Into<String>) -> Self {
        Self::StreamFetch {
            message: message.into(),
        }
    }

    /// Create stream publish error
    pub fn stream_publish(message: impl Into<String>) -> Self {
        Self::StreamPublish {
            message: message.into(),
        }
    }

    /// Create decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create invalid record error
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Create store error
    pub fn store(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create subscriber write error
    pub fn subscriber_write(peer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SubscriberWrite {
            peer: peer.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StreamFetch { .. }
                | Self::StreamCommit { .. }
                | Self::Store { .. }
                | Self::StoreTimeout { .. }
                | Self::Io(_)
        )
    }
}
