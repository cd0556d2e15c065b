//! Push channel task with a tokio mpsc command/notification pattern.
//!
//! The Socket.IO connection runs in a dedicated tokio task. The chat screen
//! talks to it through a [`PushHandle`] and receives [`PushNotification`]s,
//! so the connection is owned by whoever holds the handle and is torn down
//! deterministically by [`PushHandle::shutdown`] or by dropping every handle.

use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use vhub_shared::constants::{
    DEFAULT_RECONNECT_DELAY_MAX_MS, DEFAULT_RECONNECT_DELAY_MS, ENGINE_IO_VERSION,
    EVENT_JOIN_USER_ROOM, PUSH_CHANNEL_CAPACITY, SOCKET_IO_PATH,
};
use vhub_shared::protocol::{EnginePacket, ServerEvent, SocketPacket};
use vhub_shared::types::{Message, UserId};

use crate::error::NetError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the push task.
#[derive(Debug)]
pub enum PushCommand {
    /// Join the room of this user. Remembered and re-sent after reconnects.
    JoinRoom(UserId),
    /// Emit an arbitrary event with a single payload argument.
    Emit { event: String, payload: Value },
    /// Close the socket and end the task.
    Shutdown,
}

/// Notifications sent *from* the push task to the application.
#[derive(Debug, Clone)]
pub enum PushNotification {
    /// The default namespace accepted the connection.
    Connected,
    /// An established connection was lost. The task will reconnect.
    Disconnected { reason: String },
    /// Connecting failed or the server refused the namespace.
    ConnectError(String),
    /// A message was delivered to this user's room.
    MessageReceived(Message),
}

/// Configuration for spawning the push channel.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Server origin, e.g. `https://vms.example.org`. `ws://` URLs are accepted.
    pub socket_url: String,
    /// Sent as the Socket.IO auth payload when present.
    pub auth_token: Option<String>,
    /// First reconnection delay; doubles after each failed attempt.
    pub reconnect_delay: Duration,
    pub reconnect_delay_max: Duration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            socket_url: "http://localhost:5000".to_string(),
            auth_token: None,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            reconnect_delay_max: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MAX_MS),
        }
    }
}

/// Cloneable sender side of the push task.
#[derive(Debug, Clone)]
pub struct PushHandle {
    cmd_tx: mpsc::Sender<PushCommand>,
}

impl PushHandle {
    pub async fn join_room(&self, user: &UserId) -> Result<(), NetError> {
        self.send(PushCommand::JoinRoom(user.clone())).await
    }

    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), NetError> {
        self.send(PushCommand::Emit {
            event: event.to_string(),
            payload,
        })
        .await
    }

    /// Ask the task to close the socket. Succeeds if the task is already gone.
    pub async fn shutdown(&self) {
        if self.cmd_tx.send(PushCommand::Shutdown).await.is_err() {
            debug!("Push channel already stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    async fn send(&self, cmd: PushCommand) -> Result<(), NetError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| NetError::ChannelClosed)
    }
}

/// Spawn the push channel in a background tokio task.
///
/// Returns the command handle and the notification receiver. The task keeps
/// reconnecting until shut down; missed events are not replayed.
pub fn spawn_push_channel(config: PushConfig) -> (PushHandle, mpsc::Receiver<PushNotification>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<PushCommand>(PUSH_CHANNEL_CAPACITY);
    let (notif_tx, notif_rx) = mpsc::channel::<PushNotification>(PUSH_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        run(config, cmd_rx, notif_tx).await;
    });

    (PushHandle { cmd_tx }, notif_rx)
}

/// Build the Engine.IO WebSocket endpoint from a server origin.
pub fn engine_io_url(socket_url: &str) -> String {
    let base = socket_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}{SOCKET_IO_PATH}?EIO={ENGINE_IO_VERSION}&transport=websocket")
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// Connection state that survives reconnects.
struct Membership {
    room: Option<UserId>,
    /// Emits issued before the namespace was connected.
    pending: Vec<(String, Value)>,
}

async fn run(
    config: PushConfig,
    mut cmd_rx: mpsc::Receiver<PushCommand>,
    notif_tx: mpsc::Sender<PushNotification>,
) {
    let url = engine_io_url(&config.socket_url);
    let mut membership = Membership {
        room: None,
        pending: Vec::new(),
    };
    let mut delay = config.reconnect_delay;

    loop {
        let attempt = match connect(&url, &mut membership, &mut cmd_rx).await {
            Some(attempt) => attempt,
            None => break,
        };
        match attempt {
            Ok(socket) => {
                info!(url = %url, "Push channel socket opened");
                delay = config.reconnect_delay;
                match drive(socket, &config, &mut membership, &mut cmd_rx, &notif_tx).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost(reason) => {
                        warn!(reason = %reason, "Push channel disconnected");
                        let _ = notif_tx
                            .send(PushNotification::Disconnected { reason })
                            .await;
                    }
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Push channel connect failed");
                let _ = notif_tx
                    .send(PushNotification::ConnectError(e.to_string()))
                    .await;
            }
        }

        if !wait_before_reconnect(delay, &mut membership, &mut cmd_rx).await {
            break;
        }
        delay = (delay * 2).min(config.reconnect_delay_max);
    }

    info!("Push channel task terminated");
}

/// Open the WebSocket while still accepting commands.
/// Returns `None` when shutdown was requested before the socket opened.
async fn connect(
    url: &str,
    membership: &mut Membership,
    cmd_rx: &mut mpsc::Receiver<PushCommand>,
) -> Option<Result<Socket, WsError>> {
    let connecting = connect_async(url);
    tokio::pin!(connecting);

    loop {
        tokio::select! {
            result = &mut connecting => return Some(result.map(|(socket, _)| socket)),
            cmd = cmd_rx.recv() => match cmd {
                Some(PushCommand::JoinRoom(user)) => membership.room = Some(user),
                Some(PushCommand::Emit { event, payload }) => {
                    membership.pending.push((event, payload));
                }
                Some(PushCommand::Shutdown) | None => {
                    info!("Push channel shutdown requested while connecting");
                    return None;
                }
            }
        }
    }
}

/// Sleep for `delay` while still accepting commands.
/// Returns `false` when the task should stop instead of reconnecting.
async fn wait_before_reconnect(
    delay: Duration,
    membership: &mut Membership,
    cmd_rx: &mut mpsc::Receiver<PushCommand>,
) -> bool {
    debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(PushCommand::JoinRoom(user)) => membership.room = Some(user),
                Some(PushCommand::Emit { event, payload }) => {
                    membership.pending.push((event, payload));
                }
                Some(PushCommand::Shutdown) | None => return false,
            }
        }
    }
}

/// Run one connection until it is lost or shut down.
async fn drive(
    socket: Socket,
    config: &PushConfig,
    membership: &mut Membership,
    cmd_rx: &mut mpsc::Receiver<PushCommand>,
    notif_tx: &mpsc::Sender<PushNotification>,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();
    let mut connected = false;
    // Armed by the open packet; the server must ping within interval + timeout.
    let mut heartbeat: Option<Duration> = None;
    let deadline = tokio::time::sleep(Duration::from_secs(3600));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            // --- Heartbeat ---
            _ = &mut deadline, if heartbeat.is_some() => {
                return SessionEnd::Lost("ping timeout".into());
            }

            // --- Incoming frames ---
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Ping(data))) => {
                        if let Err(e) = sink.send(WsMessage::Pong(data)).await {
                            return SessionEnd::Lost(e.to_string());
                        }
                        continue;
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        return SessionEnd::Lost("server closed the socket".into());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("socket stream ended".into()),
                };

                let packet = match EnginePacket::decode(&text) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, len = text.len(), "Undecodable push frame");
                        continue;
                    }
                };

                let reply = match packet {
                    EnginePacket::Open(info) => {
                        debug!(
                            sid = %info.sid,
                            ping_interval = info.ping_interval,
                            ping_timeout = info.ping_timeout,
                            "Engine.IO open"
                        );
                        let window = Duration::from_millis(
                            info.ping_interval.saturating_add(info.ping_timeout),
                        );
                        heartbeat = Some(window);
                        deadline.as_mut().reset(tokio::time::Instant::now() + window);
                        let auth = config
                            .auth_token
                            .as_ref()
                            .map(|token| serde_json::json!({ "token": token }));
                        Some(EnginePacket::connect(auth))
                    }
                    EnginePacket::Ping => {
                        if let Some(window) = heartbeat {
                            deadline.as_mut().reset(tokio::time::Instant::now() + window);
                        }
                        Some(EnginePacket::Pong)
                    }
                    EnginePacket::Close => {
                        return SessionEnd::Lost("server sent close".into());
                    }
                    EnginePacket::Message(SocketPacket::Connect { .. }) => {
                        connected = true;
                        let _ = notif_tx.send(PushNotification::Connected).await;
                        if let Err(e) = flush_membership(&mut sink, membership).await {
                            return SessionEnd::Lost(e.to_string());
                        }
                        None
                    }
                    EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
                        let reason = data
                            .as_ref()
                            .and_then(|d| d.get("message"))
                            .and_then(Value::as_str)
                            .unwrap_or("namespace connection refused")
                            .to_string();
                        let _ = notif_tx
                            .send(PushNotification::ConnectError(reason.clone()))
                            .await;
                        return SessionEnd::Lost(reason);
                    }
                    EnginePacket::Message(SocketPacket::Disconnect { .. }) => {
                        return SessionEnd::Lost("server disconnected the namespace".into());
                    }
                    EnginePacket::Message(SocketPacket::Event { name, args, .. }) => {
                        match ServerEvent::from_event(name, args) {
                            Ok(ServerEvent::ReceiveMessage(message)) => {
                                debug!(
                                    msg_id = %message.id,
                                    sender = %message.sender.id,
                                    "Push message received"
                                );
                                let _ = notif_tx
                                    .send(PushNotification::MessageReceived(message))
                                    .await;
                            }
                            Ok(ServerEvent::Other { name, .. }) => {
                                debug!(event = %name, "Ignoring push event");
                            }
                            Err(e) => warn!(error = %e, "Malformed push event"),
                        }
                        None
                    }
                    _ => None,
                };

                if let Some(reply) = reply {
                    if let Err(e) = send_packet(&mut sink, &reply).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
            }

            // --- Commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(PushCommand::JoinRoom(user)) => {
                        membership.room = Some(user.clone());
                        if connected {
                            if let Err(e) = send_join(&mut sink, &user).await {
                                return SessionEnd::Lost(e.to_string());
                            }
                        }
                    }
                    Some(PushCommand::Emit { event, payload }) => {
                        if connected {
                            let packet = EnginePacket::event(&event, payload);
                            if let Err(e) = send_packet(&mut sink, &packet).await {
                                return SessionEnd::Lost(e.to_string());
                            }
                        } else {
                            membership.pending.push((event, payload));
                        }
                    }
                    Some(PushCommand::Shutdown) | None => {
                        info!("Push channel shutdown requested");
                        let disconnect = EnginePacket::Message(SocketPacket::Disconnect {
                            namespace: vhub_shared::constants::DEFAULT_NAMESPACE.to_string(),
                        });
                        let _ = send_packet(&mut sink, &disconnect).await;
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                }
            }
        }
    }
}

async fn flush_membership<S>(sink: &mut S, membership: &mut Membership) -> Result<(), NetError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    if let Some(room) = membership.room.clone() {
        send_join(sink, &room).await?;
    }
    for (event, payload) in membership.pending.drain(..) {
        send_packet(sink, &EnginePacket::event(&event, payload)).await?;
    }
    Ok(())
}

async fn send_join<S>(sink: &mut S, user: &UserId) -> Result<(), NetError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    info!(user = %user.short(), "Joining user room");
    let packet = EnginePacket::event(EVENT_JOIN_USER_ROOM, Value::String(user.to_string()));
    send_packet(sink, &packet).await
}

async fn send_packet<S>(sink: &mut S, packet: &EnginePacket) -> Result<(), NetError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let frame = packet.encode()?;
    sink.send(WsMessage::Text(frame)).await?;
    Ok(())
}
