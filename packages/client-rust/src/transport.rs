//! Transport boundary: how frames leave the client.
//!
//! The connection itself (websocket, reconnects, authentication) lives
//! outside this crate. It hands the client a [`Transport`] for outbound
//! frames and feeds inbound frames into the inbound pump.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use twinbus_core::Frame;

use crate::config::ClientConfig;

/// Error returned when a frame cannot be handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The outbound channel stayed full for the whole send timeout.
    #[error("send timed out")]
    Timeout,
    /// The connection has been closed; the receiver was dropped.
    #[error("transport disconnected")]
    Disconnected,
}

/// Outbound side of the shared message channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Emits one frame. Completion means the frame was accepted for
    /// delivery, not that the backend received it.
    async fn emit(&self, frame: Frame) -> Result<(), TransportError>;
}

/// [`Transport`] backed by a bounded mpsc channel.
///
/// The receiver end is held by the connection's write loop; this handle
/// holds the sender end and provides backpressure.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Frame>,
    send_timeout: Duration,
}

impl ChannelTransport {
    /// Creates a transport and the receiver the write loop drains.
    #[must_use]
    pub fn new(config: &ClientConfig) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(config.outbound_channel_capacity);
        (
            Self {
                tx,
                send_timeout: config.send_timeout,
            },
            rx,
        )
    }

    /// Attempts to enqueue a frame without waiting.
    ///
    /// Returns `true` if the frame was enqueued, `false` if the channel
    /// is full or closed.
    #[must_use]
    pub fn try_emit(&self, frame: Frame) -> bool {
        self.tx.try_send(frame).is_ok()
    }

    /// Returns `false` once the write loop has dropped its receiver.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Creates the bounded channel the connection's read loop feeds and
/// [`Client::start`](crate::Client::start) drains.
#[must_use]
pub fn inbound_channel(config: &ClientConfig) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
    mpsc::channel(config.inbound_channel_capacity)
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn emit(&self, frame: Frame) -> Result<(), TransportError> {
        match tokio::time::timeout(self.send_timeout, self.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
