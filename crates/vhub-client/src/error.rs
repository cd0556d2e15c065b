use thiserror::Error;

use vhub_net::NetError;
use vhub_shared::types::UserId;
use vhub_store::StoreError;

/// Precondition failures. No request is sent when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message text is empty")]
    EmptyText,

    #[error("No conversation selected")]
    NoSelection,

    #[error("A submission is already in progress")]
    Busy,

    #[error("Unknown conversation: {0}")]
    UnknownCounterpart(UserId),

    #[error("You must be logged in")]
    NotSignedIn,

    #[error("Only event managers can send broadcasts")]
    NotEventManager,

    #[error("No event selected")]
    NoEvent,

    #[error("No recipients selected")]
    NoRecipients,
}

#[derive(Error, Debug)]
pub enum ChatError {
    /// Request failed or was rejected; the view shows a banner and stays usable.
    #[error("Network error: {0}")]
    Network(NetError),

    /// 401 from the backend. The session is already cleared.
    #[error("Session expired, please log in again")]
    Auth,

    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Non-fatal: the media element degrades to a plain link.
    #[error("Media failed to load: {url}")]
    MediaLoad { url: String },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl ChatError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth)
    }
}

impl From<NetError> for ChatError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::Unauthorized => Self::Auth,
            other => Self::Network(other),
        }
    }
}
