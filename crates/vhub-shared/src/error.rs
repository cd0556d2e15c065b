use thiserror::Error;

/// Errors raised while decoding or encoding push channel packets.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown Engine.IO packet type: {0:?}")]
    UnknownEnginePacket(char),

    #[error("Unknown Socket.IO packet type: {0:?}")]
    UnknownSocketPacket(char),

    #[error("Binary Socket.IO packets are not supported")]
    BinaryUnsupported,

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
