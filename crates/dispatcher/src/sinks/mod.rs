//! Sink implementations
//!
//! Contains PersistenceSink and BroadcastSink.

mod broadcast;
mod persistence;

pub use self::broadcast::BroadcastSink;
pub use self::persistence::PersistenceSink;
