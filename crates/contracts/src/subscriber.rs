//! Live subscriber contracts
//!
//! The transport (handshake, framing) is external. The pipeline only pushes
//! encoded payloads and closes handles.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Registry-assigned subscriber identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Subscriber lifecycle.
///
/// `Connecting -> Active -> {Closed, Failed}`. Both terminal states mean the
/// subscriber has left the registry and its handle is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberState {
    #[default]
    Connecting,
    Active,
    Closed,
    Failed,
}

impl SubscriberState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// Why a subscriber left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the connection
    Graceful,
    /// A push failed or timed out
    WriteFailed,
    /// Pipeline shutdown
    Shutdown,
}

impl CloseReason {
    /// Terminal state this reason leads to.
    pub fn terminal_state(self) -> SubscriberState {
        match self {
            Self::WriteFailed => SubscriberState::Failed,
            Self::Graceful | Self::Shutdown => SubscriberState::Closed,
        }
    }
}

/// Opaque duplex handle to one live subscriber.
///
/// Object safe so that one registry can hold connections of different
/// transports.
#[async_trait]
pub trait SubscriberConnection: Send + Sync {
    /// Peer description (used for logging)
    fn peer(&self) -> &str;

    /// Push one encoded record.
    ///
    /// # Errors
    /// Any error means the connection is unusable and gets evicted.
    async fn push(&self, payload: Bytes) -> Result<(), ContractError>;

    /// Release the handle. Must be idempotent.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_terminal_state() {
        assert_eq!(
            CloseReason::WriteFailed.terminal_state(),
            SubscriberState::Failed
        );
        assert_eq!(CloseReason::Graceful.terminal_state(), SubscriberState::Closed);
        assert_eq!(CloseReason::Shutdown.terminal_state(), SubscriberState::Closed);
    }

    #[test]
    fn test_subscriber_state_terminal() {
        assert!(!SubscriberState::Connecting.is_terminal());
        assert!(!SubscriberState::Active.is_terminal());
        assert!(SubscriberState::Closed.is_terminal());
        assert!(SubscriberState::Failed.is_terminal());
    }

    #[test]
    fn test_subscriber_id_display() {
        assert_eq!(SubscriberId(7).to_string(), "sub-7");
    }
}
