use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vhub_net::PushNotification;

use crate::chat::PushTarget;

/// Forward push notifications to the chat screen until the push task ends.
///
/// The screen decides where a message goes using its selection at the time
/// the message is handled, not at the time the loop was spawned.
pub(crate) fn spawn_bridge(
    screen: PushTarget,
    notifications: mpsc::Receiver<PushNotification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        notification_loop(screen, notifications).await;
    })
}

async fn notification_loop(screen: PushTarget, mut rx: mpsc::Receiver<PushNotification>) {
    while let Some(notification) = rx.recv().await {
        match notification {
            PushNotification::Connected => {
                info!("Push channel connected");
                screen.set_connected(true).await;
            }
            PushNotification::Disconnected { reason } => {
                info!(reason = %reason, "Push channel disconnected");
                screen.set_connected(false).await;
            }
            PushNotification::ConnectError(error) => {
                warn!(error = %error, "Push channel connection error");
                screen.connection_failed().await;
            }
            PushNotification::MessageReceived(message) => {
                debug!(
                    message = %message.id,
                    sender = %message.sender.id.short(),
                    "Pushed message received"
                );
                screen.handle_incoming(message).await;
            }
        }
    }

    debug!("Push notification loop ended");
}
