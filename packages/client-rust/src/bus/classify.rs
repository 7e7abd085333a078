//! Classification of inbound messages into routing keys.

use std::fmt;

use twinbus_core::{Adaptable, Headers, Signal};

/// Key a pending subscription waits for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Matches the reply carrying this correlation id.
    CorrelationId(String),
}

impl Classification {
    #[must_use]
    pub fn correlation_id(id: impl Into<String>) -> Self {
        Self::CorrelationId(id.into())
    }

    /// Classification derived from the correlation-id header.
    #[must_use]
    pub fn of_headers(headers: &Headers) -> Option<Self> {
        headers.correlation_id().map(Self::correlation_id)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CorrelationId(id) => f.write_str(id),
        }
    }
}

/// Pure mapping from a message to the key it can be delivered under.
///
/// Messages without a classification can never match a pending
/// subscription.
pub trait Classify {
    fn classification(&self) -> Option<Classification>;
}

impl Classify for Adaptable {
    fn classification(&self) -> Option<Classification> {
        Classification::of_headers(&self.headers)
    }
}

impl Classify for Signal {
    fn classification(&self) -> Option<Classification> {
        Classification::of_headers(self.headers())
    }
}
