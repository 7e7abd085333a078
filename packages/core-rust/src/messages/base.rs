//! Concrete signal payloads: commands, responses, errors and events.
//!
//! Signal types follow the `<group>.<criterion>:<name>` convention, e.g.
//! `things.commands:modifyAttribute`. A response to a command shares the
//! command's name with `responses` as criterion.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::headers::Headers;
use crate::types::{EntityId, JsonPointer, StatusCode};

/// Entity category a signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Things,
    Policies,
}

impl Group {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Things => "things",
            Self::Policies => "policies",
        }
    }

    /// Group encoded in the prefix of a signal type (`things.` / `policies.`).
    #[must_use]
    pub fn of_signal_type(signal_type: &str) -> Option<Self> {
        signal_type
            .split_once('.')
            .and_then(|(group, _)| group.parse().ok())
    }
}

impl FromStr for Group {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "things" => Ok(Self::Things),
            "policies" => Ok(Self::Policies),
            _ => Err(ProtocolError::Malformed {
                field: "group",
                reason: format!("unknown group '{s}'"),
            }),
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Derives the response type for a command type by substituting the
/// `commands` criterion with `responses`.
#[must_use]
pub fn response_type_for(command_type: &str) -> String {
    command_type.replace(".commands", ".responses")
}

/// An outgoing (or, on the live channel, incoming) command.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub signal_type: String,
    pub entity_id: EntityId,
    pub resource_path: JsonPointer,
    pub value: Option<serde_json::Value>,
    pub headers: Headers,
}

impl Command {
    #[must_use]
    pub fn new(
        signal_type: impl Into<String>,
        entity_id: EntityId,
        resource_path: JsonPointer,
        value: Option<serde_json::Value>,
        headers: Headers,
    ) -> Self {
        Self {
            signal_type: signal_type.into(),
            entity_id,
            resource_path,
            value,
            headers,
        }
    }

    #[must_use]
    pub fn group(&self) -> Option<Group> {
        Group::of_signal_type(&self.signal_type)
    }
}

/// Successful reply to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub signal_type: String,
    pub entity_id: EntityId,
    pub resource_path: JsonPointer,
    pub status: StatusCode,
    pub entity: Option<serde_json::Value>,
    pub headers: Headers,
}

/// Error details reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Machine-readable error code, e.g. `things:thing.notfound`.
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

/// Failure reply to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub group: Group,
    pub entity_id: EntityId,
    pub status: StatusCode,
    pub error: ErrorPayload,
    pub headers: Headers,
}

/// Change event emitted by the backend (or, on the live channel, by the client).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub signal_type: String,
    pub entity_id: EntityId,
    pub resource_path: JsonPointer,
    pub value: Option<serde_json::Value>,
    pub revision: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub extra: Option<serde_json::Value>,
    pub headers: Headers,
}

impl Event {
    /// The short event name, e.g. `attributeModified`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.signal_type
            .split_once(':')
            .map_or(self.signal_type.as_str(), |(_, name)| name)
    }
}
