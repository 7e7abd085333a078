//! Client configuration.

use std::time::Duration;

use twinbus_core::WireFormat;

use crate::telemetry::LogFormat;

/// Client-level configuration for request dispatch and transport framing.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a caller waits for the reply to a request.
    pub timeout: Duration,
    /// Encoding of outgoing adaptables.
    pub wire_format: WireFormat,
    /// Bounded mpsc channel capacity for outbound frames.
    pub outbound_channel_capacity: usize,
    /// Maximum time to wait when the outbound channel is full.
    pub send_timeout: Duration,
    /// Bounded mpsc channel capacity for inbound frames.
    pub inbound_channel_capacity: usize,
    /// Output format used by `telemetry::init_tracing`.
    pub log_format: LogFormat,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            wire_format: WireFormat::Json,
            outbound_channel_capacity: 256,
            send_timeout: Duration::from_secs(5),
            inbound_channel_capacity: 256,
            log_format: LogFormat::Pretty,
        }
    }
}
