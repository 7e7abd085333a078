//! Caller-facing error taxonomy.

use std::time::Duration;

use twinbus_core::messages::ErrorPayload;
use twinbus_core::{Acknowledgements, ProtocolError, StatusCode};

use crate::bus::BusError;
use crate::resolver::ResolveError;
use crate::transport::TransportError;

/// Error reported by the backend through an error response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backend rejected request with {status}: {} ({})", .payload.message, .payload.error)]
pub struct BackendError {
    pub status: StatusCode,
    pub payload: ErrorPayload,
}

/// Every way a request issued through the client can fail.
///
/// None of these are retried inside the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no reply for correlation id '{correlation_id}' within {timeout:?}")]
    Timeout {
        correlation_id: String,
        timeout: Duration,
    },
    #[error("expected {expected}, got {actual} ({signal_type})")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
        signal_type: String,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("acknowledgements failed with overall status {}", .0.status)]
    AcknowledgementsFailed(Box<Acknowledgements>),
    #[error(
        "no acknowledgement for label '{label}' received; request '{label}' whenever the response is processed by the client"
    )]
    MissingPersistedAcknowledgement { label: &'static str },
    #[error("a request with correlation id '{0}' is already pending")]
    AlreadyPending(String),
    #[error("client is shut down")]
    Closed,
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol failure: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<BusError> for ClientError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Timeout {
                classification,
                timeout,
            } => Self::Timeout {
                correlation_id: classification.to_string(),
                timeout,
            },
            BusError::AlreadyPending(classification) => Self::AlreadyPending(classification.to_string()),
            BusError::Closed => Self::Closed,
        }
    }
}

impl From<ResolveError> for ClientError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::AcknowledgementsFailed(set) => Self::AcknowledgementsFailed(set),
            ResolveError::MissingPersisted { label } => Self::MissingPersistedAcknowledgement { label },
        }
    }
}
