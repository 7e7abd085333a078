//! Client facade: wires dispatcher, change registry and inbound pump.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use twinbus_core::messages::Command;
use twinbus_core::{Frame, Signal};

use crate::changes::ChangeRegistry;
use crate::config::ClientConfig;
use crate::dispatcher::RequestDispatcher;
use crate::handle::Handle;
use crate::live::LiveCommand;
use crate::pump::InboundPump;
use crate::transport::Transport;

/// A connected client.
///
/// Created by [`Client::start`]; [`Client::shutdown`] stops inbound
/// processing and fails every request still waiting for a reply.
pub struct Client {
    config: ClientConfig,
    dispatcher: Arc<RequestDispatcher>,
    changes: Arc<ChangeRegistry>,
    pump: InboundPump,
}

impl Client {
    /// Starts the client on an established connection.
    ///
    /// `transport` carries outbound frames; `inbound` yields frames read
    /// from the connection. Inbound signals nobody was waiting for (live
    /// commands, foreign replies) arrive on the returned receiver. Must be
    /// called within a Tokio runtime.
    #[must_use]
    pub fn start(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        inbound: mpsc::Receiver<Frame>,
    ) -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let dispatcher = Arc::new(RequestDispatcher::new(&config, transport));
        let changes = Arc::new(ChangeRegistry::new(Arc::clone(&dispatcher)));
        let (unmatched_tx, unmatched_rx) = mpsc::unbounded_channel();
        let pump = InboundPump::start(inbound, Arc::clone(&dispatcher), Arc::clone(&changes), unmatched_tx);

        info!(
            timeout = ?config.timeout,
            wire_format = ?config.wire_format,
            "client started"
        );
        let client = Self {
            config,
            dispatcher,
            changes,
            pump,
        };
        (client, unmatched_rx)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn twin(&self) -> Handle {
        Handle::twin(Arc::clone(&self.dispatcher))
    }

    #[must_use]
    pub fn live(&self) -> Handle {
        Handle::live(Arc::clone(&self.dispatcher))
    }

    #[must_use]
    pub fn policies(&self) -> Handle {
        Handle::policies(Arc::clone(&self.dispatcher))
    }

    #[must_use]
    pub fn changes(&self) -> &ChangeRegistry {
        &self.changes
    }

    /// Wraps an inbound live command so it can be answered.
    #[must_use]
    pub fn live_command(&self, command: Command) -> LiveCommand {
        LiveCommand::new(command, Arc::clone(&self.dispatcher))
    }

    /// Stops the inbound pump, then fails all waiting requests with
    /// `ClientError::Closed`.
    pub async fn shutdown(mut self) {
        self.pump.stop().await;
        self.dispatcher.shutdown();
        info!("client shut down");
    }
}

#[cfg(test)]
mod tests {
    use twinbus_core::messages::{CommandResponse, ErrorResponse};
    use twinbus_core::{Headers, JsonPointer};

    use super::*;
    use crate::dispatcher::tests::RecordingTransport;
    use crate::error::ClientError;

    #[tokio::test]
    async fn shutdown_fails_outstanding_requests() {
        let (transport, mut sent) = RecordingTransport::new();
        let (_frames, inbound) = mpsc::channel(4);
        let (client, _unmatched) = Client::start(ClientConfig::default(), transport, inbound);

        let dispatcher = Arc::clone(client.dispatcher());
        let call = tokio::spawn(async move {
            let command = Command::new(
                "things.commands:retrieveThing",
                "org.acme:lamp".parse().unwrap(),
                JsonPointer::root(),
                None,
                Headers::new(),
            );
            dispatcher
                .send_and_await(
                    Signal::Command(command),
                    |r: CommandResponse| r,
                    |e: ErrorResponse| ClientError::TypeMismatch {
                        expected: "CommandResponse",
                        actual: "ErrorResponse",
                        signal_type: e.error.error,
                    },
                )
                .await
        });
        sent.recv().await.unwrap();

        client.shutdown().await;
        assert!(matches!(call.await.unwrap(), Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn handles_use_their_channels() {
        let (transport, _sent) = RecordingTransport::new();
        let (_frames, inbound) = mpsc::channel(4);
        let (client, _unmatched) = Client::start(ClientConfig::default(), transport, inbound);

        assert_eq!(client.twin().channel(), twinbus_core::Channel::Twin);
        assert_eq!(client.live().channel(), twinbus_core::Channel::Live);
        assert_eq!(client.policies().channel(), twinbus_core::Channel::None);
        assert!(client.changes().is_empty());
        client.shutdown().await;
    }
}
