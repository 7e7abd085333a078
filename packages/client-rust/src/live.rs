//! Replies to commands received on the live channel.

use std::sync::Arc;

use chrono::Utc;
use twinbus_core::messages::{response_type_for, Command, CommandResponse, Event};
use twinbus_core::{Channel, Headers, Signal, StatusCode};

use crate::adjust::adjust_for_channel;
use crate::dispatcher::RequestDispatcher;
use crate::error::ClientError;

/// An inbound live command the application can answer.
pub struct LiveCommand {
    command: Command,
    emitter: Arc<RequestDispatcher>,
}

impl LiveCommand {
    #[must_use]
    pub fn new(command: Command, emitter: Arc<RequestDispatcher>) -> Self {
        Self { command, emitter }
    }

    #[must_use]
    pub fn command(&self) -> &Command {
        &self.command
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.command.headers.correlation_id()
    }

    /// Fresh live headers carrying only the command's correlation id.
    fn reply_headers(&self) -> Headers {
        let headers = Headers::new().with_channel(Channel::Live);
        match self.correlation_id() {
            Some(id) => headers.with_correlation_id(id),
            None => headers,
        }
    }

    /// Answers the command with a response of the matching type.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be encoded or emitted.
    pub async fn respond(&self, status: StatusCode, entity: Option<serde_json::Value>) -> Result<(), ClientError> {
        let response = CommandResponse {
            signal_type: response_type_for(&self.command.signal_type),
            entity_id: self.command.entity_id.clone(),
            resource_path: self.command.resource_path.clone(),
            status,
            entity,
            headers: self.reply_headers(),
        };
        self.emit(Signal::CommandResponse(response)).await
    }

    /// Publishes the event `event_name` caused by handling the command.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be encoded or emitted.
    pub async fn emit_event(&self, event_name: &str, value: Option<serde_json::Value>) -> Result<(), ClientError> {
        let group = self.command.group().unwrap_or(twinbus_core::messages::Group::Things);
        let event = Event {
            signal_type: format!("{group}.events:{event_name}"),
            entity_id: self.command.entity_id.clone(),
            resource_path: self.command.resource_path.clone(),
            value,
            revision: 0,
            timestamp: Some(Utc::now()),
            extra: None,
            headers: self.reply_headers(),
        };
        self.emit(Signal::Event(event)).await
    }

    async fn emit(&self, signal: Signal) -> Result<(), ClientError> {
        self.emitter.emit(adjust_for_channel(signal, Channel::Live)).await
    }
}

#[cfg(test)]
mod tests {
    use twinbus_core::{JsonPointer, SignalKind};

    use super::*;
    use crate::config::ClientConfig;
    use crate::dispatcher::tests::{decode_signal, RecordingTransport};

    fn inbound() -> Command {
        Command::new(
            "things.commands:modifyFeatureProperty",
            "org.acme:lamp".parse().unwrap(),
            JsonPointer::parse("/features/light/properties/on"),
            Some(serde_json::json!(true)),
            Headers::new()
                .with_correlation_id("live-1")
                .with_channel(Channel::Live)
                .with("read-subjects", "[\"nginx:bob\"]"),
        )
    }

    #[tokio::test]
    async fn respond_carries_correlation_and_channel() {
        let (transport, mut sent) = RecordingTransport::new();
        let dispatcher = Arc::new(RequestDispatcher::new(&ClientConfig::default(), transport));
        let live = LiveCommand::new(inbound(), dispatcher);

        live.respond(StatusCode::NO_CONTENT, None).await.unwrap();

        let response = CommandResponse::try_from_signal(decode_signal(&sent.recv().await.unwrap())).unwrap();
        assert_eq!(response.signal_type, "things.responses:modifyFeatureProperty");
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(response.headers.correlation_id(), Some("live-1"));
        assert_eq!(response.headers.channel(), Channel::Live);
        assert!(!response.headers.contains("read-subjects"));
    }

    #[tokio::test]
    async fn emit_event_uses_command_group_and_path() {
        let (transport, mut sent) = RecordingTransport::new();
        let dispatcher = Arc::new(RequestDispatcher::new(&ClientConfig::default(), transport));
        let live = LiveCommand::new(inbound(), dispatcher);

        live.emit_event("featurePropertyModified", Some(serde_json::json!(true)))
            .await
            .unwrap();

        let event = Event::try_from_signal(decode_signal(&sent.recv().await.unwrap())).unwrap();
        assert_eq!(event.signal_type, "things.events:featurePropertyModified");
        assert_eq!(event.resource_path.to_string(), "/features/light/properties/on");
        assert_eq!(event.headers.correlation_id(), Some("live-1"));
        assert!(event.timestamp.is_some());
    }
}
