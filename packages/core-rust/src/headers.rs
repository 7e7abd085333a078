//! Signal headers and the well-known header keys of the protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::acks::AcknowledgementLabel;
use crate::channel::Channel;

/// Well-known header keys.
pub mod keys {
    pub const CORRELATION_ID: &str = "correlation-id";
    pub const CHANNEL: &str = "channel";
    pub const RESPONSE_REQUIRED: &str = "response-required";
    /// Server-computed subjects allowed to read the signal.
    pub const READ_SUBJECTS: &str = "read-subjects";
    /// Server-trusted authorization context of the original sender.
    pub const AUTHORIZATION_CONTEXT: &str = "authorization-context";
    /// JSON array of requested acknowledgement labels.
    pub const REQUESTED_ACKS: &str = "requested-acks";
}

/// Immutable string-to-string header map.
///
/// Mutation goes through copy-with-change helpers (`with`, `without`) so a
/// signal's headers are never changed in place after it has been built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.0.clone();
        next.insert(key.into(), value.into());
        Self(next)
    }

    /// Returns a copy without `key`.
    #[must_use]
    pub fn without(&self, key: &str) -> Self {
        let mut next = self.0.clone();
        next.remove(key);
        Self(next)
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.get(keys::CORRELATION_ID)
    }

    #[must_use]
    pub fn with_correlation_id(&self, correlation_id: impl Into<String>) -> Self {
        self.with(keys::CORRELATION_ID, correlation_id)
    }

    /// Returns these headers unchanged if a correlation id is present,
    /// otherwise a copy carrying a freshly generated UUID v4.
    #[must_use]
    pub fn ensure_correlation_id(self) -> Self {
        if self.correlation_id().is_some() {
            return self;
        }
        self.with_correlation_id(uuid::Uuid::new_v4().to_string())
    }

    /// Channel the signal is addressed to. Absent or unknown values mean twin.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.get(keys::CHANNEL)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn with_channel(&self, channel: Channel) -> Self {
        self.with(keys::CHANNEL, channel.name())
    }

    /// Whether the sender expects a response. Defaults to `true`.
    #[must_use]
    pub fn is_response_required(&self) -> bool {
        !matches!(self.get(keys::RESPONSE_REQUIRED), Some(raw) if raw.eq_ignore_ascii_case("false"))
    }

    #[must_use]
    pub fn with_response_required(&self, required: bool) -> Self {
        self.with(keys::RESPONSE_REQUIRED, required.to_string())
    }

    /// Acknowledgement labels requested for this signal, in header order.
    ///
    /// A missing or malformed header yields an empty list.
    #[must_use]
    pub fn requested_acks(&self) -> Vec<AcknowledgementLabel> {
        let Some(raw) = self.get(keys::REQUESTED_ACKS) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<AcknowledgementLabel>>(raw) {
            Ok(labels) => labels,
            Err(err) => {
                tracing::debug!(header = raw, error = %err, "ignoring malformed requested-acks header");
                Vec::new()
            }
        }
    }

    #[must_use]
    pub fn with_requested_acks<I>(&self, labels: I) -> Self
    where
        I: IntoIterator<Item = AcknowledgementLabel>,
    {
        let labels: Vec<String> = labels.into_iter().map(String::from).collect();
        let raw = serde_json::Value::from(labels).to_string();
        self.with(keys::REQUESTED_ACKS, raw)
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
