/// Errors raised while parsing or encoding protocol structures.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid entity id '{0}': expected '<namespace>:<name>'")]
    InvalidEntityId(String),
    #[error("invalid topic path '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: &'static str },
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("adaptable is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("malformed '{field}': {reason}")]
    Malformed { field: &'static str, reason: String },
    #[error("wire codec failure: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ProtocolError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
