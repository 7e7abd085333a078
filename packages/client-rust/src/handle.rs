//! Channel-bound request helpers shared by the twin, live and policy APIs.

use std::sync::Arc;

use twinbus_core::messages::{Command, CommandResponse, ErrorResponse};
use twinbus_core::{Channel, Signal};

use crate::adjust::adjust_for_channel;
use crate::dispatcher::RequestDispatcher;
use crate::error::{BackendError, ClientError};

/// Discards a successful result, for callers that only care about
/// completion.
pub fn to_void<T>(_result: T) {}

fn backend_error(response: ErrorResponse) -> ClientError {
    BackendError {
        status: response.status,
        payload: response.error,
    }
    .into()
}

/// Issues commands on one logical channel.
#[derive(Clone)]
pub struct Handle {
    dispatcher: Arc<RequestDispatcher>,
    channel: Channel,
}

impl Handle {
    #[must_use]
    pub fn twin(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            dispatcher,
            channel: Channel::Twin,
        }
    }

    #[must_use]
    pub fn live(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            dispatcher,
            channel: Channel::Live,
        }
    }

    /// Handle for policy commands, which are not bound to a channel.
    #[must_use]
    pub fn policies(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            dispatcher,
            channel: Channel::None,
        }
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Sends a thing command on this handle's channel and maps the
    /// response with `on_success`.
    ///
    /// # Errors
    ///
    /// Fails with `ClientError::Backend` on an error response, or with any
    /// other [`ClientError`] the dispatcher reports.
    pub async fn ask_thing_command<R, F>(&self, command: Command, on_success: F) -> Result<R, ClientError>
    where
        F: FnOnce(CommandResponse) -> R,
    {
        let signal = adjust_for_channel(Signal::Command(command), self.channel);
        self.dispatcher
            .send_and_await::<CommandResponse, ErrorResponse, R, F, _>(signal, on_success, backend_error)
            .await
    }

    /// Sends a policy command as-is and maps the response with `on_success`.
    ///
    /// # Errors
    ///
    /// Same as [`ask_thing_command`](Self::ask_thing_command).
    pub async fn ask_policy_command<R, F>(&self, command: Command, on_success: F) -> Result<R, ClientError>
    where
        F: FnOnce(CommandResponse) -> R,
    {
        self.dispatcher
            .send_and_await::<CommandResponse, ErrorResponse, R, F, _>(Signal::Command(command), on_success, backend_error)
            .await
    }

    /// Emits a signal on the live channel without awaiting a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be encoded or emitted.
    pub async fn emit_live_signal(&self, signal: Signal) -> Result<(), ClientError> {
        self.dispatcher
            .emit(adjust_for_channel(signal, Channel::Live))
            .await
    }

    /// Emits a protocol command such as `START-SEND-EVENTS?filter=...`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the frame cannot be emitted.
    pub async fn send_protocol_command<'a, I>(&self, command: &str, params: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Ok(self.dispatcher.emit_protocol_command(command, params).await?)
    }
}
