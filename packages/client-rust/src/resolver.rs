//! Resolution of an acknowledgement set into a single command response.

use twinbus_core::messages::{response_type_for, CommandResponse};
use twinbus_core::{Acknowledgements, Signal, TWIN_PERSISTED};

/// Why an acknowledgement set could not be turned into a response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    /// Overall status is 4xx/5xx. Carries the whole set for per-label detail.
    #[error("acknowledgements failed with overall status {}", .0.status)]
    AcknowledgementsFailed(Box<Acknowledgements>),
    /// The set succeeded but lacks the persisted acknowledgement, so no
    /// response can be derived from it.
    #[error("no acknowledgement for label '{label}' received")]
    MissingPersisted { label: &'static str },
}

/// Synthesizes the logical response to `request` from `acknowledgements`.
///
/// The response type is the request type with `commands` replaced by
/// `responses`, the resource path is the request's. Entity id, status,
/// headers and entity come from the `twin-persisted` acknowledgement.
///
/// # Errors
///
/// - `AcknowledgementsFailed` when the overall status is an error; members
///   are not inspected.
/// - `MissingPersisted` when no member carries the `twin-persisted` label.
pub fn resolve(request: &Signal, acknowledgements: Acknowledgements) -> Result<CommandResponse, ResolveError> {
    if acknowledgements.is_failed() {
        return Err(ResolveError::AcknowledgementsFailed(Box::new(acknowledgements)));
    }

    let persisted = acknowledgements
        .acknowledgements
        .into_iter()
        .find(|ack| ack.label.is_twin_persisted())
        .ok_or(ResolveError::MissingPersisted {
            label: TWIN_PERSISTED,
        })?;

    Ok(CommandResponse {
        signal_type: response_type_for(&request.signal_type()),
        entity_id: persisted.entity_id,
        resource_path: request.resource_path(),
        status: persisted.status,
        entity: persisted.payload,
        headers: persisted.headers,
    })
}
