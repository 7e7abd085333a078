//! Change notifications derived from backend events.

use chrono::{DateTime, Utc};

use crate::acks::AcknowledgementLabel;
use crate::headers::Headers;
use crate::messages::Event;
use crate::types::{EntityId, JsonPointer};

/// Action that caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    Created,
    Updated,
    Merged,
    Deleted,
}

impl ChangeAction {
    /// Derives the action from an event name such as `attributeModified`.
    #[must_use]
    pub fn from_event_name(name: &str) -> Option<Self> {
        if name.ends_with("Created") {
            Some(Self::Created)
        } else if name.ends_with("Modified") {
            Some(Self::Updated)
        } else if name.ends_with("Merged") {
            Some(Self::Merged)
        } else if name.ends_with("Deleted") {
            Some(Self::Deleted)
        } else {
            None
        }
    }
}

/// Immutable view of one change to an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub action: ChangeAction,
    pub entity_id: EntityId,
    path: JsonPointer,
    value: Option<serde_json::Value>,
    revision: i64,
    timestamp: Option<DateTime<Utc>>,
    extra: Option<serde_json::Value>,
    headers: Headers,
}

impl ChangeNotification {
    /// Builds a notification from an event.
    ///
    /// Events whose name does not map to a [`ChangeAction`] yield `None`.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        let action = ChangeAction::from_event_name(event.name())?;
        Some(Self {
            action,
            entity_id: event.entity_id.clone(),
            path: event.resource_path.clone(),
            value: event.value.clone(),
            revision: event.revision,
            timestamp: event.timestamp,
            extra: event.extra.clone(),
            headers: event.headers.clone(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &JsonPointer {
        &self.path
    }

    #[must_use]
    pub fn value(&self) -> Option<&serde_json::Value> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn revision(&self) -> i64 {
        self.revision
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    #[must_use]
    pub fn extra(&self) -> Option<&serde_json::Value> {
        self.extra.as_ref()
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Acknowledgement labels the backend asked the client to answer.
    #[must_use]
    pub fn requested_acks(&self) -> Vec<AcknowledgementLabel> {
        self.headers.requested_acks()
    }

    /// True iff the change covers the whole registration root (empty path).
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.path.is_empty()
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.is_full()
    }

    /// Returns a copy carrying `extra` in place of the current enrichment.
    #[must_use]
    pub fn with_extra(&self, extra: Option<serde_json::Value>) -> Self {
        Self {
            extra,
            ..self.clone()
        }
    }

    /// Returns a copy relocated to `path` with `value`.
    #[must_use]
    pub fn with_path_and_value(&self, path: JsonPointer, value: Option<serde_json::Value>) -> Self {
        Self {
            path,
            value,
            ..self.clone()
        }
    }
}
