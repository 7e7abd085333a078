//! Call/await on top of the fire-and-forget transport.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use twinbus_core::messages::codec;
use twinbus_core::protocol::build_protocol_command;
use twinbus_core::{Adaptable, Frame, ProtocolError, Signal, SignalKind, WireFormat};

use crate::adjust::adjust_for_channel;
use crate::bus::{Classification, CorrelationBus};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::resolver::resolve;
use crate::transport::{Transport, TransportError};

/// Sends signals and awaits their correlated replies.
///
/// Owns the correlation bus for its client: created with the client and
/// closed by [`shutdown`](Self::shutdown), which fails every caller still
/// waiting.
pub struct RequestDispatcher {
    bus: CorrelationBus<Adaptable>,
    transport: Arc<dyn Transport>,
    wire_format: WireFormat,
    timeout: Duration,
}

impl RequestDispatcher {
    #[must_use]
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            bus: CorrelationBus::new(),
            transport,
            wire_format: config.wire_format,
            timeout: config.timeout,
        }
    }

    /// Reply timeout applied to every request.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.bus.pending_count()
    }

    #[must_use]
    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.bus.is_pending(&Classification::correlation_id(correlation_id))
    }

    /// Sends `signal` and maps its correlated reply.
    ///
    /// The reply is interpreted in this order:
    /// 1. an `E` is handed to `on_error` and the call fails with its result;
    /// 2. an acknowledgement set is resolved into a command response, which
    ///    then has to be an `S`;
    /// 3. an `S` is handed to `on_success`;
    /// 4. anything else fails with `ClientError::TypeMismatch`.
    ///
    /// A missing correlation id is generated; live signals are stripped of
    /// server-trusted headers. The reply subscription is registered before
    /// the signal is emitted. Dropping the returned future cancels the
    /// subscription, so the correlation id can be reused right away.
    ///
    /// # Errors
    ///
    /// Every failure of the call, see [`ClientError`].
    pub async fn send_and_await<S, E, R, F, G>(&self, signal: Signal, on_success: F, on_error: G) -> Result<R, ClientError>
    where
        S: SignalKind,
        E: SignalKind,
        F: FnOnce(S) -> R,
        G: FnOnce(E) -> ClientError,
    {
        let signal = prepare(signal);
        let classification = Classification::of_headers(signal.headers())
            .ok_or(ProtocolError::MissingField("correlation-id"))?;
        let frame = self.encode(&signal)?;

        let reply = self.bus.subscribe_once(classification, self.timeout)?;
        if let Err(err) = self.transport.emit(frame).await {
            self.bus.unsubscribe(&reply);
            warn!(correlation_id = %reply.classification(), error = %err, "emit failed");
            return Err(err.into());
        }
        debug!(
            correlation_id = %reply.classification(),
            signal_type = %signal.signal_type(),
            pending = self.bus.pending_count(),
            "request sent"
        );

        let adaptable = reply.await.map_err(|err| {
            debug!(error = %err, "request did not complete");
            ClientError::from(err)
        })?;
        let inbound = adaptable.into_signal()?;
        debug!(
            correlation_id = inbound.correlation_id().unwrap_or_default(),
            signal_type = %inbound.signal_type(),
            "reply received"
        );
        interpret::<S, E, R, F, G>(&signal, inbound, on_success, on_error)
    }

    /// Emits `signal` without awaiting a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be encoded or emitted.
    pub async fn emit(&self, signal: Signal) -> Result<(), ClientError> {
        let channel = signal.channel();
        let signal = adjust_for_channel(signal, channel);
        let frame = self.encode(&signal)?;
        self.transport.emit(frame).await?;
        debug!(signal_type = %signal.signal_type(), "signal emitted");
        Ok(())
    }

    /// Emits a plain-text protocol command such as `START-SEND-EVENTS`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the frame cannot be emitted.
    pub async fn emit_protocol_command<'a, I>(&self, command: &str, params: I) -> Result<(), TransportError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let text = build_protocol_command(command, params);
        debug!(command = %text, "protocol command");
        self.transport.emit(Frame::Text(text)).await
    }

    /// Decodes an inbound frame and routes it to the caller waiting for it.
    ///
    /// Returns the decoded signal when no caller was waiting for it.
    ///
    /// # Errors
    ///
    /// Returns a `ProtocolError` when the frame is not a valid adaptable or
    /// an unmatched adaptable cannot be decoded into a signal.
    pub fn handle_inbound(&self, frame: &Frame) -> Result<Option<Signal>, ProtocolError> {
        let adaptable = codec::decode(frame)?;
        match self.bus.publish(adaptable) {
            None => Ok(None),
            Some(unmatched) => unmatched.into_signal().map(Some),
        }
    }

    /// Fails every waiting caller with `ClientError::Closed` and rejects
    /// new requests.
    pub fn shutdown(&self) {
        let drained = self.bus.close();
        debug!(drained, "dispatcher shut down");
    }

    fn encode(&self, signal: &Signal) -> Result<Frame, ProtocolError> {
        self.wire_format.encode(&Adaptable::from_signal(signal))
    }
}

/// Ensures a correlation id and applies the live-channel header rules.
fn prepare(signal: Signal) -> Signal {
    let headers = signal.headers().clone().ensure_correlation_id();
    let channel = headers.channel();
    adjust_for_channel(signal.with_headers(headers), channel)
}

fn interpret<S, E, R, F, G>(request: &Signal, inbound: Signal, on_success: F, on_error: G) -> Result<R, ClientError>
where
    S: SignalKind,
    E: SignalKind,
    F: FnOnce(S) -> R,
    G: FnOnce(E) -> ClientError,
{
    let inbound = match E::try_from_signal(inbound) {
        Ok(error) => return Err(on_error(error)),
        Err(other) => other,
    };
    let inbound = match inbound {
        Signal::Acknowledgements(acknowledgements) => Signal::CommandResponse(resolve(request, acknowledgements)?),
        other => other,
    };
    match S::try_from_signal(inbound) {
        Ok(expected) => Ok(on_success(expected)),
        Err(actual) => {
            warn!(
                expected = S::KIND,
                actual = actual.kind_name(),
                signal_type = %actual.signal_type(),
                "unexpected reply kind"
            );
            Err(ClientError::TypeMismatch {
                expected: S::KIND,
                actual: actual.kind_name(),
                signal_type: actual.signal_type().into_owned(),
            })
        }
    }
}
