use thiserror::Error;

use vhub_shared::error::ProtocolError;

#[derive(Error, Debug)]
pub enum NetError {
    /// The request never produced a response (DNS, connect, timeout, ...).
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered 401. The session has already been invalidated.
    #[error("Unauthorized: session cleared")]
    Unauthorized,

    #[error("Server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Push channel closed")]
    ChannelClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl NetError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
