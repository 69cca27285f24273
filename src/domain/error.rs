use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown node: {0}")]
    UnknownNode(u64),
    #[error("channel closed: {0}")]
    ChannelClosed(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
