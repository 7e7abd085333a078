//! Framing of adaptables for the transport.
//!
//! JSON adaptables travel as text frames. `MsgPack` adaptables travel as
//! binary frames encoded with `rmp_serde::to_vec_named()` so optional
//! fields can be omitted from the map.

use serde::{Deserialize, Serialize};

use super::adaptable::Adaptable;
use crate::error::ProtocolError;

/// Encoding used for outgoing adaptables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Json,
    MsgPack,
}

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WireFormat {
    /// Encodes an adaptable into a frame of this format.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Codec` if serialization fails.
    pub fn encode(self, adaptable: &Adaptable) -> Result<Frame, ProtocolError> {
        match self {
            Self::Json => Ok(Frame::Text(serde_json::to_string(adaptable)?)),
            Self::MsgPack => Ok(Frame::Binary(rmp_serde::to_vec_named(adaptable)?)),
        }
    }
}

/// Decodes a frame. Text frames are JSON, binary frames are `MsgPack`.
///
/// # Errors
///
/// Returns `ProtocolError::Codec` if the frame is not a valid adaptable.
pub fn decode(frame: &Frame) -> Result<Adaptable, ProtocolError> {
    match frame {
        Frame::Text(text) => Ok(serde_json::from_str(text)?),
        Frame::Binary(bytes) => Ok(rmp_serde::from_slice(bytes)?),
    }
}
