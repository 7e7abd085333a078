use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Identifier of a managed entity (thing or policy) in `<namespace>:<name>` form.
///
/// The namespace may be empty (`:lamp`), the name may not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    namespace: String,
    name: String,
}

impl EntityId {
    /// Builds an id from its two halves.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidEntityId` if `name` is empty or the
    /// namespace contains a `:`.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, ProtocolError> {
        let namespace = namespace.into();
        let name = name.into();
        if name.is_empty() || namespace.contains(':') {
            return Err(ProtocolError::InvalidEntityId(format!("{namespace}:{name}")));
        }
        Ok(Self { namespace, name })
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for EntityId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Err(ProtocolError::InvalidEntityId(s.to_string())),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Slash-separated pointer into an entity's JSON representation.
///
/// `""` and `"/"` both denote the root pointer, which is empty.
/// Consecutive slashes are collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct JsonPointer {
    segments: Vec<String>,
}

impl JsonPointer {
    /// The root pointer.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a pointer. Never fails: every string is a valid pointer.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns a new pointer with `segment` appended.
    #[must_use]
    pub fn append(&self, segment: &str) -> Self {
        let mut next = self.clone();
        next.segments.extend(Self::parse(segment).segments);
        next
    }
}

impl From<String> for JsonPointer {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for JsonPointer {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<JsonPointer> for String {
    fn from(pointer: JsonPointer) -> Self {
        pointer.to_string()
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// HTTP-style status code attached to responses and acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: Self = Self(200);
    pub const CREATED: Self = Self(201);
    pub const NO_CONTENT: Self = Self(204);
    pub const BAD_REQUEST: Self = Self(400);
    pub const NOT_FOUND: Self = Self(404);
    pub const REQUEST_TIMEOUT: Self = Self(408);
    pub const FAILED_DEPENDENCY: Self = Self(424);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);

    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    #[must_use]
    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.0)
    }

    #[must_use]
    pub fn is_server_error(self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
