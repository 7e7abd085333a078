//! Signals exchanged with the backend and their wire envelope.
//!
//! - [`base`]: concrete command, response, error and event payloads
//! - [`adaptable`]: the `Adaptable` wire envelope and `Signal` conversion
//! - [`codec`]: JSON / `MsgPack` framing of adaptables

pub mod adaptable;
pub mod base;
pub mod codec;

use std::borrow::Cow;

pub use adaptable::{Adaptable, Criterion, TopicPath, WireAcknowledgement};
pub use base::{response_type_for, Command, CommandResponse, ErrorPayload, ErrorResponse, Event, Group};
pub use codec::{Frame, WireFormat};

use crate::acks::{Acknowledgement, Acknowledgements};
use crate::channel::Channel;
use crate::headers::Headers;
use crate::types::{EntityId, JsonPointer};

/// Any message that travels over the shared channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Command(Command),
    CommandResponse(CommandResponse),
    ErrorResponse(ErrorResponse),
    /// A single acknowledgement, sent by the client for a requested label.
    Acknowledgement(Acknowledgement),
    /// The aggregated acknowledgement set returned for a command.
    Acknowledgements(Acknowledgements),
    Event(Event),
}

impl Signal {
    /// Name of the variant, used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Command(_) => Command::KIND,
            Self::CommandResponse(_) => CommandResponse::KIND,
            Self::ErrorResponse(_) => ErrorResponse::KIND,
            Self::Acknowledgement(_) => Acknowledgement::KIND,
            Self::Acknowledgements(_) => Acknowledgements::KIND,
            Self::Event(_) => Event::KIND,
        }
    }

    /// Fully qualified signal type, e.g. `things.commands:modifyThing`.
    #[must_use]
    pub fn signal_type(&self) -> Cow<'_, str> {
        match self {
            Self::Command(c) => Cow::Borrowed(&c.signal_type),
            Self::CommandResponse(r) => Cow::Borrowed(&r.signal_type),
            Self::ErrorResponse(e) => Cow::Owned(format!("{}.errors", e.group)),
            Self::Acknowledgement(a) => Cow::Owned(format!("things.acks:{}", a.label)),
            Self::Acknowledgements(_) => Cow::Borrowed("things.acks"),
            Self::Event(e) => Cow::Borrowed(&e.signal_type),
        }
    }

    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::Command(c) => &c.entity_id,
            Self::CommandResponse(r) => &r.entity_id,
            Self::ErrorResponse(e) => &e.entity_id,
            Self::Acknowledgement(a) => &a.entity_id,
            Self::Acknowledgements(a) => &a.entity_id,
            Self::Event(e) => &e.entity_id,
        }
    }

    /// Path of the affected resource. Errors and acknowledgements address the root.
    #[must_use]
    pub fn resource_path(&self) -> JsonPointer {
        match self {
            Self::Command(c) => c.resource_path.clone(),
            Self::CommandResponse(r) => r.resource_path.clone(),
            Self::Event(e) => e.resource_path.clone(),
            Self::ErrorResponse(_) | Self::Acknowledgement(_) | Self::Acknowledgements(_) => {
                JsonPointer::root()
            }
        }
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        match self {
            Self::Command(c) => &c.headers,
            Self::CommandResponse(r) => &r.headers,
            Self::ErrorResponse(e) => &e.headers,
            Self::Acknowledgement(a) => &a.headers,
            Self::Acknowledgements(a) => &a.headers,
            Self::Event(e) => &e.headers,
        }
    }

    /// Returns this signal with its headers replaced.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        match &mut self {
            Self::Command(c) => c.headers = headers,
            Self::CommandResponse(r) => r.headers = headers,
            Self::ErrorResponse(e) => e.headers = headers,
            Self::Acknowledgement(a) => a.headers = headers,
            Self::Acknowledgements(a) => a.headers = headers,
            Self::Event(e) => e.headers = headers,
        }
        self
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        self.headers().channel()
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.headers().correlation_id()
    }

    #[must_use]
    pub fn group(&self) -> Group {
        match self {
            Self::ErrorResponse(e) => e.group,
            Self::Acknowledgement(_) | Self::Acknowledgements(_) => Group::Things,
            other => Group::of_signal_type(&other.signal_type()).unwrap_or(Group::Things),
        }
    }
}

/// A signal shape that can be extracted from a [`Signal`] by value.
///
/// Used by callers to name the reply kind they expect; the extraction
/// hands the signal back untouched when it is of a different kind.
pub trait SignalKind: Sized {
    /// Human-readable kind name for type-mismatch diagnostics.
    const KIND: &'static str;

    /// Extracts `Self` from `signal`.
    ///
    /// # Errors
    ///
    /// Returns the original signal if it is not of this kind.
    fn try_from_signal(signal: Signal) -> Result<Self, Signal>;
}

macro_rules! signal_kind {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl SignalKind for $ty {
            const KIND: &'static str = $name;

            fn try_from_signal(signal: Signal) -> Result<Self, Signal> {
                match signal {
                    Signal::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }

        impl From<$ty> for Signal {
            fn from(inner: $ty) -> Self {
                Signal::$variant(inner)
            }
        }
    };
}

signal_kind!(Command, Command, "Command");
signal_kind!(CommandResponse, CommandResponse, "CommandResponse");
signal_kind!(ErrorResponse, ErrorResponse, "ErrorResponse");
signal_kind!(Acknowledgement, Acknowledgement, "Acknowledgement");
signal_kind!(Acknowledgements, Acknowledgements, "Acknowledgements");
signal_kind!(Event, Event, "Event");

impl SignalKind for Signal {
    const KIND: &'static str = "Signal";

    fn try_from_signal(signal: Signal) -> Result<Self, Signal> {
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusCode;

    fn command() -> Command {
        Command::new(
            "things.commands:modifyAttribute",
            "org.acme:lamp".parse().unwrap(),
            JsonPointer::parse("/attributes/color"),
            Some(serde_json::json!("red")),
            Headers::new().with_correlation_id("c1"),
        )
    }

    #[test]
    fn accessors_delegate_to_variant() {
        let signal = Signal::from(command());
        assert_eq!(signal.kind_name(), "Command");
        assert_eq!(signal.signal_type(), "things.commands:modifyAttribute");
        assert_eq!(signal.correlation_id(), Some("c1"));
        assert_eq!(signal.resource_path().to_string(), "/attributes/color");
        assert_eq!(signal.channel(), Channel::Twin);
        assert_eq!(signal.group(), Group::Things);
    }

    #[test]
    fn with_headers_replaces_whole_map() {
        let signal = Signal::from(command()).with_headers(Headers::new().with("x", "y"));
        assert_eq!(signal.correlation_id(), None);
        assert_eq!(signal.headers().get("x"), Some("y"));
    }

    #[test]
    fn try_from_signal_hands_back_other_kinds() {
        let signal = Signal::from(command());
        let back = CommandResponse::try_from_signal(signal).unwrap_err();
        assert!(Command::try_from_signal(back).is_ok());
    }

    #[test]
    fn error_response_type_uses_group() {
        let signal = Signal::ErrorResponse(ErrorResponse {
            group: Group::Policies,
            entity_id: "org.acme:policy".parse().unwrap(),
            status: StatusCode::NOT_FOUND,
            error: ErrorPayload {
                error: "policies:policy.notfound".to_string(),
                message: "not found".to_string(),
                description: None,
            },
            headers: Headers::new(),
        });
        assert_eq!(signal.signal_type(), "policies.errors");
        assert_eq!(signal.group(), Group::Policies);
        assert!(signal.resource_path().is_empty());
    }
}
