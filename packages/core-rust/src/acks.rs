//! Acknowledgements: per-label confirmations and their aggregated set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::headers::Headers;
use crate::types::{EntityId, StatusCode};

/// Label issued by the backend once a modifying command has been durably
/// applied to the persisted twin.
pub const TWIN_PERSISTED: &str = "twin-persisted";

/// Opaque acknowledgement label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcknowledgementLabel(String);

impl AcknowledgementLabel {
    /// The persisted marker label.
    #[must_use]
    pub fn twin_persisted() -> Self {
        Self(TWIN_PERSISTED.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_twin_persisted(&self) -> bool {
        self.0 == TWIN_PERSISTED
    }
}

impl From<&str> for AcknowledgementLabel {
    fn from(label: &str) -> Self {
        Self(label.to_string())
    }
}

impl From<String> for AcknowledgementLabel {
    fn from(label: String) -> Self {
        Self(label)
    }
}

impl From<AcknowledgementLabel> for String {
    fn from(label: AcknowledgementLabel) -> Self {
        label.0
    }
}

impl PartialEq<str> for AcknowledgementLabel {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl fmt::Display for AcknowledgementLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single acknowledgement for one label.
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    pub label: AcknowledgementLabel,
    pub entity_id: EntityId,
    pub status: StatusCode,
    pub headers: Headers,
    pub payload: Option<serde_json::Value>,
}

impl Acknowledgement {
    #[must_use]
    pub fn new(label: AcknowledgementLabel, entity_id: EntityId, status: StatusCode) -> Self {
        Self {
            label,
            entity_id,
            status,
            headers: Headers::new(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Option<serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }
}

/// Aggregated acknowledgement set: an overall status plus the individual
/// acknowledgements in the order the backend reported them.
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgements {
    pub entity_id: EntityId,
    pub status: StatusCode,
    pub acknowledgements: Vec<Acknowledgement>,
    pub headers: Headers,
}

impl Acknowledgements {
    /// Builds a set whose overall status is derived from its members:
    /// a single member lends its own status, an all-successful set is
    /// `200`, anything else is `424 Failed Dependency`.
    #[must_use]
    pub fn aggregate(entity_id: EntityId, acknowledgements: Vec<Acknowledgement>, headers: Headers) -> Self {
        let status = match acknowledgements.as_slice() {
            [single] => single.status,
            many if many.iter().all(|ack| ack.status.is_success()) => StatusCode::OK,
            _ => StatusCode::FAILED_DEPENDENCY,
        };
        Self {
            entity_id,
            status,
            acknowledgements,
            headers,
        }
    }

    /// Whether the overall status is a client or server error.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// First acknowledgement carrying `label`.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Acknowledgement> {
        self.acknowledgements.iter().find(|ack| ack.label == *label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Acknowledgement> {
        self.acknowledgements.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.acknowledgements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.acknowledgements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thing() -> EntityId {
        "org.acme:lamp".parse().unwrap()
    }

    fn ack(label: &str, status: u16) -> Acknowledgement {
        Acknowledgement::new(label.into(), thing(), StatusCode(status))
    }

    #[test]
    fn aggregate_single_takes_member_status() {
        let set = Acknowledgements::aggregate(thing(), vec![ack(TWIN_PERSISTED, 204)], Headers::new());
        assert_eq!(set.status, StatusCode::NO_CONTENT);
        assert!(!set.is_failed());
    }

    #[test]
    fn aggregate_all_success_is_ok() {
        let set = Acknowledgements::aggregate(
            thing(),
            vec![ack(TWIN_PERSISTED, 204), ack("custom", 200)],
            Headers::new(),
        );
        assert_eq!(set.status, StatusCode::OK);
    }

    #[test]
    fn aggregate_with_failure_is_failed_dependency() {
        let set = Acknowledgements::aggregate(
            thing(),
            vec![ack(TWIN_PERSISTED, 204), ack("custom", 408)],
            Headers::new(),
        );
        assert_eq!(set.status, StatusCode::FAILED_DEPENDENCY);
        assert!(set.is_failed());
    }

    #[test]
    fn get_finds_first_matching_label_in_order() {
        let set = Acknowledgements::aggregate(
            thing(),
            vec![ack("custom", 200), ack(TWIN_PERSISTED, 201), ack(TWIN_PERSISTED, 204)],
            Headers::new(),
        );
        assert_eq!(set.get(TWIN_PERSISTED).unwrap().status, StatusCode::CREATED);
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn label_helpers() {
        assert!(AcknowledgementLabel::twin_persisted().is_twin_persisted());
        assert!(!AcknowledgementLabel::from("live-response").is_twin_persisted());
    }
}
