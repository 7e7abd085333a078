//! The `Adaptable` wire envelope: topic, headers, path and payload of one
//! protocol message, plus its lossless conversion to and from [`Signal`].
//!
//! # Topic format
//!
//! `<namespace>/<name>/<group>/<channel>/<criterion>[/<action>]`
//!
//! Policy topics omit the channel segment. An empty namespace is written as
//! `_`. The action of commands, responses and events is the short signal
//! name; a single acknowledgement uses its label; errors and acknowledgement
//! sets carry no action.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::base::{Command, CommandResponse, ErrorPayload, ErrorResponse, Event, Group};
use super::Signal;
use crate::acks::{Acknowledgement, AcknowledgementLabel, Acknowledgements};
use crate::channel::Channel;
use crate::error::ProtocolError;
use crate::headers::Headers;
use crate::types::{EntityId, JsonPointer, StatusCode};

const EMPTY_NAMESPACE: &str = "_";

/// What kind of message a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criterion {
    Commands,
    Events,
    Errors,
    Acks,
}

impl Criterion {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Commands => "commands",
            Self::Events => "events",
            Self::Errors => "errors",
            Self::Acks => "acks",
        }
    }
}

impl FromStr for Criterion {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commands" => Ok(Self::Commands),
            "events" => Ok(Self::Events),
            "errors" => Ok(Self::Errors),
            "acks" => Ok(Self::Acks),
            _ => Err("unknown criterion"),
        }
    }
}

/// Parsed topic of an [`Adaptable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicPath {
    pub entity_id: EntityId,
    pub group: Group,
    pub channel: Channel,
    pub criterion: Criterion,
    pub action: Option<String>,
}

impl TopicPath {
    #[must_use]
    pub fn new(entity_id: EntityId, group: Group, channel: Channel, criterion: Criterion) -> Self {
        let channel = match group {
            Group::Policies => Channel::None,
            Group::Things if channel == Channel::None => Channel::Twin,
            Group::Things => channel,
        };
        Self {
            entity_id,
            group,
            channel,
            criterion,
            action: None,
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

impl FromStr for TopicPath {
    type Err = ProtocolError;

    fn from_str(topic: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ProtocolError::InvalidTopic {
            topic: topic.to_string(),
            reason,
        };

        let segments: Vec<&str> = topic.split('/').collect();
        let [namespace, name, group, rest @ ..] = segments.as_slice() else {
            return Err(invalid("expected at least namespace, name and group"));
        };
        let group: Group = group.parse().map_err(|_| invalid("unknown group"))?;
        let (channel, rest) = match group {
            Group::Things => {
                let [channel, rest @ ..] = rest else {
                    return Err(invalid("missing channel"));
                };
                let channel: Channel = channel.parse().map_err(|_| invalid("unknown channel"))?;
                (channel, rest)
            }
            Group::Policies => (Channel::None, rest),
        };
        let (criterion, action) = match rest {
            [criterion] => (*criterion, None),
            [criterion, action] => (*criterion, Some((*action).to_string())),
            [] => return Err(invalid("missing criterion")),
            _ => return Err(invalid("too many segments")),
        };
        let criterion: Criterion = criterion.parse().map_err(invalid)?;

        let namespace = if *namespace == EMPTY_NAMESPACE { "" } else { *namespace };
        let entity_id = EntityId::new(namespace, *name)?;

        Ok(Self {
            entity_id,
            group,
            channel,
            criterion,
            action,
        })
    }
}

impl TryFrom<String> for TopicPath {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TopicPath> for String {
    fn from(topic: TopicPath) -> Self {
        topic.to_string()
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let namespace = match self.entity_id.namespace() {
            "" => EMPTY_NAMESPACE,
            ns => ns,
        };
        write!(f, "{namespace}/{}/{}", self.entity_id.name(), self.group)?;
        if self.group == Group::Things {
            write!(f, "/{}", self.channel)?;
        }
        write!(f, "/{}", self.criterion.name())?;
        if let Some(action) = &self.action {
            write!(f, "/{action}")?;
        }
        Ok(())
    }
}

/// One member of an acknowledgement set as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAcknowledgement {
    pub label: AcknowledgementLabel,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entity_id: Option<EntityId>,
    pub status: StatusCode,
    #[serde(skip_serializing_if = "Headers::is_empty", default)]
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<serde_json::Value>,
}

/// Wire envelope for one protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adaptable {
    pub topic: TopicPath,
    #[serde(skip_serializing_if = "Headers::is_empty", default)]
    pub headers: Headers,
    #[serde(default)]
    pub path: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<StatusCode>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub revision: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extra: Option<serde_json::Value>,
}

impl Adaptable {
    fn bare(topic: TopicPath, headers: Headers) -> Self {
        Self {
            topic,
            headers,
            path: JsonPointer::root(),
            value: None,
            status: None,
            revision: None,
            timestamp: None,
            extra: None,
        }
    }

    /// Correlation id carried in the headers, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.headers.correlation_id()
    }

    /// Wraps a signal into its wire envelope.
    #[must_use]
    pub fn from_signal(signal: &Signal) -> Self {
        let group = signal.group();
        let channel = signal.channel();
        let entity_id = signal.entity_id().clone();
        let topic = |criterion| TopicPath::new(entity_id.clone(), group, channel, criterion);

        match signal {
            Signal::Command(c) => Self {
                path: c.resource_path.clone(),
                value: c.value.clone(),
                ..Self::bare(
                    topic(Criterion::Commands).with_action(short_name(&c.signal_type)),
                    c.headers.clone(),
                )
            },
            Signal::CommandResponse(r) => Self {
                path: r.resource_path.clone(),
                value: r.entity.clone(),
                status: Some(r.status),
                ..Self::bare(
                    topic(Criterion::Commands).with_action(short_name(&r.signal_type)),
                    r.headers.clone(),
                )
            },
            Signal::ErrorResponse(e) => Self {
                value: Some(error_payload_value(&e.error)),
                status: Some(e.status),
                ..Self::bare(topic(Criterion::Errors), e.headers.clone())
            },
            Signal::Acknowledgement(a) => Self {
                value: a.payload.clone(),
                status: Some(a.status),
                ..Self::bare(
                    topic(Criterion::Acks).with_action(a.label.as_str()),
                    a.headers.clone(),
                )
            },
            Signal::Acknowledgements(set) => Self {
                value: Some(acknowledgements_value(set)),
                status: Some(set.status),
                ..Self::bare(topic(Criterion::Acks), set.headers.clone())
            },
            Signal::Event(e) => Self {
                path: e.resource_path.clone(),
                value: e.value.clone(),
                revision: Some(e.revision),
                timestamp: e.timestamp,
                extra: e.extra.clone(),
                ..Self::bare(
                    topic(Criterion::Events).with_action(short_name(&e.signal_type)),
                    e.headers.clone(),
                )
            },
        }
    }

    /// Decodes the envelope into a [`Signal`].
    ///
    /// Topics on the live channel mark the signal's headers with
    /// `channel=live` unless a channel header is already present.
    ///
    /// # Errors
    ///
    /// Returns a `ProtocolError` when a field required by the topic's
    /// criterion is missing or malformed.
    pub fn into_signal(self) -> Result<Signal, ProtocolError> {
        let topic = self.topic;
        let mut headers = self.headers;
        if topic.channel == Channel::Live && !headers.contains(crate::headers::keys::CHANNEL) {
            headers = headers.with_channel(Channel::Live);
        }
        let group = topic.group;
        let entity_id = topic.entity_id;

        let signal = match topic.criterion {
            Criterion::Commands => {
                let action = topic.action.ok_or(ProtocolError::MissingField("topic action"))?;
                match self.status {
                    Some(status) => Signal::CommandResponse(CommandResponse {
                        signal_type: format!("{group}.responses:{action}"),
                        entity_id,
                        resource_path: self.path,
                        status,
                        entity: self.value,
                        headers,
                    }),
                    None => Signal::Command(Command {
                        signal_type: format!("{group}.commands:{action}"),
                        entity_id,
                        resource_path: self.path,
                        value: self.value,
                        headers,
                    }),
                }
            }
            Criterion::Events => {
                let action = topic.action.ok_or(ProtocolError::MissingField("topic action"))?;
                Signal::Event(Event {
                    signal_type: format!("{group}.events:{action}"),
                    entity_id,
                    resource_path: self.path,
                    value: self.value,
                    revision: self.revision.unwrap_or_default(),
                    timestamp: self.timestamp,
                    extra: self.extra,
                    headers,
                })
            }
            Criterion::Errors => {
                let status = self.status.ok_or(ProtocolError::MissingField("status"))?;
                let value = self.value.ok_or(ProtocolError::MissingField("value"))?;
                let error: ErrorPayload =
                    serde_json::from_value(value).map_err(|err| ProtocolError::Malformed {
                        field: "value",
                        reason: err.to_string(),
                    })?;
                Signal::ErrorResponse(ErrorResponse {
                    group,
                    entity_id,
                    status,
                    error,
                    headers,
                })
            }
            Criterion::Acks => {
                let status = self.status.ok_or(ProtocolError::MissingField("status"))?;
                match topic.action {
                    Some(label) => Signal::Acknowledgement(
                        Acknowledgement::new(label.into(), entity_id, status)
                            .with_headers(headers)
                            .with_payload(self.value),
                    ),
                    None => {
                        let members: Vec<WireAcknowledgement> = match self.value {
                            Some(value) => serde_json::from_value(value).map_err(|err| {
                                ProtocolError::Malformed {
                                    field: "value",
                                    reason: err.to_string(),
                                }
                            })?,
                            None => Vec::new(),
                        };
                        let acknowledgements = members
                            .into_iter()
                            .map(|member| Acknowledgement {
                                label: member.label,
                                entity_id: member.entity_id.unwrap_or_else(|| entity_id.clone()),
                                status: member.status,
                                headers: member.headers,
                                payload: member.payload,
                            })
                            .collect();
                        Signal::Acknowledgements(Acknowledgements {
                            entity_id,
                            status,
                            acknowledgements,
                            headers,
                        })
                    }
                }
            }
        };
        Ok(signal)
    }
}

impl From<&Signal> for Adaptable {
    fn from(signal: &Signal) -> Self {
        Self::from_signal(signal)
    }
}

impl TryFrom<Adaptable> for Signal {
    type Error = ProtocolError;

    fn try_from(adaptable: Adaptable) -> Result<Self, Self::Error> {
        adaptable.into_signal()
    }
}

fn short_name(signal_type: &str) -> &str {
    signal_type
        .split_once(':')
        .map_or(signal_type, |(_, name)| name)
}

fn error_payload_value(error: &ErrorPayload) -> serde_json::Value {
    let mut value = serde_json::json!({
        "error": error.error,
        "message": error.message,
    });
    if let (Some(description), Some(map)) = (&error.description, value.as_object_mut()) {
        map.insert("description".to_string(), description.clone().into());
    }
    value
}

fn acknowledgements_value(set: &Acknowledgements) -> serde_json::Value {
    let members = set
        .iter()
        .map(|ack| {
            let mut member = serde_json::json!({
                "label": ack.label.as_str(),
                "status": ack.status.as_u16(),
            });
            if let Some(map) = member.as_object_mut() {
                if ack.entity_id != set.entity_id {
                    map.insert("entityId".to_string(), ack.entity_id.to_string().into());
                }
                if !ack.headers.is_empty() {
                    let headers = ack
                        .headers
                        .iter()
                        .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
                        .collect();
                    map.insert("headers".to_string(), serde_json::Value::Object(headers));
                }
                if let Some(payload) = &ack.payload {
                    map.insert("payload".to_string(), payload.clone());
                }
            }
            member
        })
        .collect();
    serde_json::Value::Array(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acks::TWIN_PERSISTED;

    fn lamp() -> EntityId {
        "org.acme:lamp".parse().unwrap()
    }

    #[test]
    fn topic_formats_things_with_channel() {
        let topic = TopicPath::new(lamp(), Group::Things, Channel::Live, Criterion::Commands)
            .with_action("modifyAttribute");
        assert_eq!(topic.to_string(), "org.acme/lamp/things/live/commands/modifyAttribute");
    }

    #[test]
    fn topic_formats_policies_without_channel() {
        let topic = TopicPath::new(lamp(), Group::Policies, Channel::Live, Criterion::Errors);
        assert_eq!(topic.to_string(), "org.acme/lamp/policies/errors");
        let parsed: TopicPath = "org.acme/lamp/policies/errors".parse().unwrap();
        assert_eq!(parsed, topic);
    }

    #[test]
    fn topic_empty_namespace_uses_placeholder() {
        let id: EntityId = ":lamp".parse().unwrap();
        let topic = TopicPath::new(id.clone(), Group::Things, Channel::Twin, Criterion::Acks);
        assert_eq!(topic.to_string(), "_/lamp/things/twin/acks");
        let parsed: TopicPath = topic.to_string().parse().unwrap();
        assert_eq!(parsed.entity_id, id);
    }

    #[test]
    fn topic_parse_rejects_garbage() {
        assert!("a/b".parse::<TopicPath>().is_err());
        assert!("a/b/things".parse::<TopicPath>().is_err());
        assert!("a/b/things/moon/commands".parse::<TopicPath>().is_err());
        assert!("a/b/things/twin/gossip".parse::<TopicPath>().is_err());
        assert!("a/b/things/twin/commands/x/y".parse::<TopicPath>().is_err());
    }

    #[test]
    fn command_with_status_decodes_as_response() {
        let adaptable = Adaptable {
            status: Some(StatusCode::NO_CONTENT),
            path: JsonPointer::parse("/attributes/color"),
            ..Adaptable::bare(
                TopicPath::new(lamp(), Group::Things, Channel::Twin, Criterion::Commands)
                    .with_action("modifyAttribute"),
                Headers::new().with_correlation_id("c1"),
            )
        };
        let Signal::CommandResponse(response) = adaptable.into_signal().unwrap() else {
            panic!("expected a command response");
        };
        assert_eq!(response.signal_type, "things.responses:modifyAttribute");
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(response.headers.correlation_id(), Some("c1"));
    }

    #[test]
    fn live_topic_marks_channel_header() {
        let adaptable = Adaptable::bare(
            TopicPath::new(lamp(), Group::Things, Channel::Live, Criterion::Commands)
                .with_action("retrieveThing"),
            Headers::new(),
        );
        let signal = adaptable.into_signal().unwrap();
        assert_eq!(signal.channel(), Channel::Live);
    }

    #[test]
    fn acknowledgement_set_keeps_member_order_and_defaults_entity() {
        let other: EntityId = "org.acme:other".parse().unwrap();
        let set = Acknowledgements {
            entity_id: lamp(),
            status: StatusCode::OK,
            acknowledgements: vec![
                Acknowledgement::new("custom".into(), lamp(), StatusCode::OK),
                Acknowledgement::new(TWIN_PERSISTED.into(), other.clone(), StatusCode::NO_CONTENT)
                    .with_headers(Headers::new().with("etag", "\"rev:4\""))
                    .with_payload(Some(serde_json::json!({"on": true}))),
            ],
            headers: Headers::new().with_correlation_id("c9"),
        };
        let adaptable = Adaptable::from_signal(&Signal::Acknowledgements(set.clone()));
        assert_eq!(adaptable.topic.to_string(), "org.acme/lamp/things/twin/acks");

        let Signal::Acknowledgements(decoded) = adaptable.into_signal().unwrap() else {
            panic!("expected an acknowledgement set");
        };
        assert_eq!(decoded, set);
        assert_eq!(decoded.acknowledgements[0].label.as_str(), "custom");
        assert_eq!(decoded.acknowledgements[1].entity_id, other);
    }

    #[test]
    fn error_without_status_is_rejected() {
        let adaptable = Adaptable {
            value: Some(serde_json::json!({"error": "x", "message": "y"})),
            ..Adaptable::bare(
                TopicPath::new(lamp(), Group::Things, Channel::Twin, Criterion::Errors),
                Headers::new(),
            )
        };
        assert!(matches!(
            adaptable.into_signal(),
            Err(ProtocolError::MissingField("status"))
        ));
    }

    #[test]
    fn event_round_trips_revision_and_extra() {
        let event = Event {
            signal_type: "things.events:attributeModified".to_string(),
            entity_id: lamp(),
            resource_path: JsonPointer::parse("/attributes/color"),
            value: Some(serde_json::json!("blue")),
            revision: 42,
            timestamp: None,
            extra: Some(serde_json::json!({"attributes": {"room": "kitchen"}})),
            headers: Headers::new().with_correlation_id("e1"),
        };
        let adaptable = Adaptable::from_signal(&Signal::Event(event.clone()));
        assert_eq!(adaptable.revision, Some(42));
        assert_eq!(adaptable.into_signal().unwrap(), Signal::Event(event));
    }
}
