use serde::Serialize;
use tokio::sync::mpsc;

use vhub_shared::types::{MessageId, UserId};

/// Notifications for the view layer. Each one tells the view which part of
/// the screen snapshot changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    DirectoryUpdated,
    ThreadLoaded { counterpart: UserId },
    MessageAppended { counterpart: UserId, message_id: MessageId },
    UnreadChanged { counterpart: UserId, count: u32 },
    ConversationAdded { counterpart: UserId },
    /// Inline media of a message is now shown as a link.
    MediaDegraded { message_id: MessageId },
    /// User-visible error banner.
    Error { message: String },
    SessionExpired,
    ConnectionChanged { connected: bool },
}

/// Sending half of the view event stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A dropped receiver is logged and otherwise ignored.
    pub fn emit(&self, event: ChatEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::error!(event = ?e.0, "Failed to emit chat event");
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(ChatEvent::Error {
            message: message.into(),
        });
    }
}
