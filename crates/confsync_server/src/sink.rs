//! Per-connection push delivery.

use confsync_protocol::PushEnvelope;
use std::sync::mpsc::{self, Receiver, Sender};
use thiserror::Error;

/// Why a single delivery failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The peer is gone; the connection should be dropped.
    #[error("connection closed")]
    Closed,
    /// The transport refused this message.
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Something that can hand an envelope to one connected client.
///
/// Implementations must not block on the peer: delivery is fire-and-forget.
pub trait PushSink: Send + Sync {
    /// Delivers one envelope.
    fn deliver(&self, envelope: &PushEnvelope) -> Result<(), DeliveryError>;
}

/// A [`PushSink`] backed by an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<PushEnvelope>,
}

impl ChannelSink {
    /// Wraps an existing sender.
    pub fn new(tx: Sender<PushEnvelope>) -> Self {
        Self { tx }
    }

    /// Creates a sink and the receiver the client side reads from.
    pub fn pair() -> (Self, Receiver<PushEnvelope>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }
}

impl PushSink for ChannelSink {
    fn deliver(&self, envelope: &PushEnvelope) -> Result<(), DeliveryError> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| DeliveryError::Closed)
    }
}
