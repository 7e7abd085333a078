use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Logical routing channel of a signal.
///
/// `Twin` addresses the persisted digital twin and is the default when a
/// signal carries no channel header. `Live` addresses an online device
/// session. `None` is used by signals that are not channel-scoped
/// (policies).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Twin,
    Live,
    None,
}

impl Channel {
    /// Wire name used in the `channel` header and in topic paths.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Twin => "twin",
            Self::Live => "live",
            Self::None => "none",
        }
    }
}

impl FromStr for Channel {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twin" => Ok(Self::Twin),
            "live" => Ok(Self::Live),
            "none" => Ok(Self::None),
            other => Err(ProtocolError::UnknownChannel(other.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
