//! Chat screen: one conversation directory, the open thread and the composer,
//! kept consistent with REST results and pushed messages.
//!
//! Screen state lives behind an async mutex that is never held across a
//! network call. Each operation locks, takes what it needs, releases, awaits
//! the request and locks again to apply the result.

use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vhub_net::{ChatApi, NetError, PushHandle, PushNotification};
use vhub_shared::types::{ConversationEntry, CurrentUser, Message, MessageId, Role, UserId, UserRef};

use crate::bridge::spawn_bridge;
use crate::composer::Composer;
use crate::directory::{ConversationDirectory, Routing};
use crate::error::{ChatError, ValidationError};
use crate::events::{ChatEvent, EventSink};
use crate::session::SessionHandle;
use crate::thread::{MessageThread, RenderOptions, ThreadRow};

pub const CONNECTION_ERROR_BANNER: &str = "Connection error. Please refresh the page.";

#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Ignore pushed messages whose sender is the signed-in user.
    pub filter_self_echo: bool,
    pub render: RenderOptions,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            filter_self_echo: true,
            render: RenderOptions::default(),
        }
    }
}

#[derive(Debug, Default)]
struct ChatState {
    directory: ConversationDirectory,
    thread: MessageThread,
    composer: Composer,
    connected: bool,
    error: Option<String>,
}

/// Push channel and bridge owned by the screen. Dropping the last screen
/// clone drops the handle, which ends the push task.
#[derive(Default)]
struct Lifecycle {
    push: Option<PushHandle>,
    bridge: Option<JoinHandle<()>>,
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.abort();
        }
    }
}

/// The part of the screen the push bridge writes to. Holds no reference to
/// the push channel itself.
#[derive(Clone)]
pub(crate) struct PushTarget {
    state: Arc<Mutex<ChatState>>,
    events: EventSink,
    filter_self_echo: bool,
    me: UserId,
}

impl PushTarget {
    /// Apply a pushed message. The signed-in user never gets a directory
    /// entry of their own.
    pub(crate) async fn handle_incoming(&self, message: Message) {
        if message.sender.id == self.me {
            self.handle_own(message).await;
            return;
        }

        let mut state = self.state.lock().await;
        match state.directory.on_message_received(&message) {
            Routing::Thread => {
                let counterpart = message.sender.id.clone();
                let message_id = message.id.clone();
                state.thread.append(message);
                self.events.emit(ChatEvent::MessageAppended {
                    counterpart,
                    message_id,
                });
            }
            Routing::Unread { count, new_entry } => {
                let counterpart = message.sender.id;
                if new_entry {
                    self.events.emit(ChatEvent::ConversationAdded {
                        counterpart: counterpart.clone(),
                    });
                }
                self.events.emit(ChatEvent::UnreadChanged { counterpart, count });
            }
        }
    }

    async fn handle_own(&self, message: Message) {
        if self.filter_self_echo {
            debug!(message = %message.id, "Ignoring echo of own message");
            return;
        }

        let mut state = self.state.lock().await;
        let Some(counterpart) = state.thread.counterpart().map(|c| c.id.clone()) else {
            debug!(message = %message.id, "Own message with no open thread");
            return;
        };
        let message_id = message.id.clone();
        state.thread.append(message);
        self.events.emit(ChatEvent::MessageAppended {
            counterpart,
            message_id,
        });
    }

    pub(crate) async fn set_connected(&self, connected: bool) {
        let mut state = self.state.lock().await;
        if state.connected != connected {
            state.connected = connected;
            self.events.emit(ChatEvent::ConnectionChanged { connected });
        }
    }

    pub(crate) async fn connection_failed(&self) {
        let mut state = self.state.lock().await;
        state.connected = false;
        state.error = Some(CONNECTION_ERROR_BANNER.to_string());
        self.events.error(CONNECTION_ERROR_BANNER);
    }
}

/// Everything the view needs to draw the screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSnapshot {
    pub title: &'static str,
    pub conversations: Vec<ConversationEntry>,
    pub total_unread: u32,
    pub selected: Option<UserRef>,
    pub rows: Vec<ThreadRow>,
    pub loading: bool,
    pub composer_text: String,
    pub can_submit: bool,
    pub sending: bool,
    pub connected: bool,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ChatScreen {
    state: Arc<Mutex<ChatState>>,
    lifecycle: Arc<StdMutex<Lifecycle>>,
    api: Arc<dyn ChatApi>,
    session: SessionHandle,
    events: EventSink,
    options: ChatOptions,
    me: CurrentUser,
}

impl ChatScreen {
    /// Create the screen for the signed-in user.
    pub fn new(
        api: Arc<dyn ChatApi>,
        session: SessionHandle,
        events: EventSink,
        options: ChatOptions,
    ) -> Result<Self, ChatError> {
        let me = match (session.is_signed_in(), session.current_user()) {
            (true, Some(user)) => user,
            _ => return Err(ValidationError::NotSignedIn.into()),
        };

        Ok(Self {
            state: Arc::new(Mutex::new(ChatState::default())),
            lifecycle: Arc::new(StdMutex::new(Lifecycle::default())),
            api,
            session,
            events,
            options,
            me,
        })
    }

    pub fn title(&self) -> &'static str {
        title_for(&self.me.role)
    }

    pub fn me(&self) -> &CurrentUser {
        &self.me
    }

    /// Join the user's push room, start forwarding push notifications and
    /// load the directory.
    pub async fn mount(
        &self,
        push: PushHandle,
        notifications: mpsc::Receiver<PushNotification>,
    ) -> Result<(), ChatError> {
        push.join_room(&self.me.id).await?;
        let bridge = spawn_bridge(self.push_target(), notifications);

        let previous = {
            let mut lifecycle = self.lifecycle();
            let previous = lifecycle.push.replace(push);
            if let Some(old) = lifecycle.bridge.replace(bridge) {
                old.abort();
            }
            previous
        };
        if let Some(old) = previous {
            old.shutdown().await;
        }

        info!(user = %self.me.id.short(), "Chat screen mounted");
        self.load_directory().await
    }

    /// Shut the push channel down and discard the thread.
    pub async fn unmount(&self) {
        let (push, bridge) = {
            let mut lifecycle = self.lifecycle();
            (lifecycle.push.take(), lifecycle.bridge.take())
        };
        if let Some(push) = push {
            push.shutdown().await;
        }
        if let Some(bridge) = bridge {
            bridge.abort();
        }

        let mut state = self.state.lock().await;
        state.directory.deselect();
        state.thread.close();
        state.connected = false;
        debug!("Chat screen unmounted");
    }

    pub async fn load_directory(&self) -> Result<(), ChatError> {
        self.state.lock().await.directory.begin_refresh();

        let result = self.api.list_counterparts().await;

        let mut state = self.state.lock().await;
        match result {
            Ok(entries) => {
                debug!(count = entries.len(), "Loaded conversations");
                state.directory.apply_refresh(entries);
                self.events.emit(ChatEvent::DirectoryUpdated);
                Ok(())
            }
            Err(e) => Err(self.fail(&mut state, e, "Failed to load conversations")),
        }
    }

    /// Select a counterpart and load the history with them. A completion for
    /// a selection the user already left is dropped.
    pub async fn select(&self, counterpart: &UserId) -> Result<(), ChatError> {
        let ticket = {
            let mut state = self.state.lock().await;
            let selected = state.directory.select(counterpart)?;
            state.error = None;
            self.events.emit(ChatEvent::UnreadChanged {
                counterpart: counterpart.clone(),
                count: 0,
            });
            state.thread.open(selected)
        };

        let result = self.api.fetch_history(&ticket.counterpart).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(messages) => {
                if state.thread.apply_history(&ticket, messages) {
                    state.directory.reset_unread(&ticket.counterpart);
                    self.events.emit(ChatEvent::ThreadLoaded {
                        counterpart: ticket.counterpart.clone(),
                    });
                }
                Ok(())
            }
            Err(e) => {
                if state.thread.fail_history(&ticket) {
                    Err(self.fail(&mut state, e, "Failed to load messages"))
                } else {
                    debug!(error = %e, "Ignoring failure of stale history request");
                    Ok(())
                }
            }
        }
    }

    pub async fn deselect(&self) {
        let mut state = self.state.lock().await;
        state.directory.deselect();
        state.thread.close();
    }

    pub async fn compose(&self, text: impl Into<String>) {
        self.state.lock().await.composer.compose(text);
    }

    /// Send the composed reply to the selected counterpart.
    pub async fn submit(&self) -> Result<(), ChatError> {
        let submission = {
            let mut state = self.state.lock().await;
            let ChatState {
                directory,
                composer,
                ..
            } = &mut *state;
            composer.begin_submit(directory.selected())?
        };

        let result = self
            .api
            .send_reply(&submission.recipient.id, &submission.text)
            .await;

        let mut state = self.state.lock().await;
        match result {
            Ok(message) => {
                state.composer.finish_success();
                let still_open = state
                    .thread
                    .counterpart()
                    .is_some_and(|c| c.id == submission.recipient.id);
                if still_open {
                    let message_id = message.id.clone();
                    state.thread.append(message);
                    self.events.emit(ChatEvent::MessageAppended {
                        counterpart: submission.recipient.id,
                        message_id,
                    });
                }
                Ok(())
            }
            Err(e) => {
                state.composer.finish_failure();
                Err(self.fail(&mut state, e, "Failed to send message"))
            }
        }
    }

    /// Apply a pushed message.
    pub async fn handle_incoming(&self, message: Message) {
        self.push_target().handle_incoming(message).await;
    }

    /// The view failed to load the media of a message; it degrades to a link.
    pub async fn report_media_error(&self, message_id: &MessageId) -> bool {
        let mut state = self.state.lock().await;
        if !state.thread.media_failed(message_id) {
            return false;
        }

        let url = state
            .thread
            .messages()
            .iter()
            .find(|m| &m.id == message_id)
            .and_then(|m| m.media.as_ref())
            .map(|m| m.url.clone())
            .unwrap_or_default();
        let err = ChatError::MediaLoad { url };
        warn!(error = %err, message = %message_id, "Showing media as link");
        self.events.emit(ChatEvent::MediaDegraded {
            message_id: message_id.clone(),
        });
        true
    }

    pub(crate) fn push_target(&self) -> PushTarget {
        PushTarget {
            state: self.state.clone(),
            events: self.events.clone(),
            filter_self_echo: self.options.filter_self_echo,
            me: self.me.id.clone(),
        }
    }

    pub async fn snapshot(&self) -> ChatSnapshot {
        let state = self.state.lock().await;
        let selected = state.directory.selected().cloned();
        ChatSnapshot {
            title: self.title(),
            conversations: state.directory.entries().to_vec(),
            total_unread: state.directory.total_unread(),
            rows: state.thread.render(&self.options.render),
            loading: state.thread.is_loading(),
            composer_text: state.composer.text().to_string(),
            can_submit: state.composer.can_submit(selected.as_ref()),
            sending: state.composer.is_busy(),
            connected: state.connected,
            error: state.error.clone(),
            selected,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Turn a request failure into the screen's error state. Auth failures
    /// end the session instead of showing a banner.
    fn fail(&self, state: &mut ChatState, e: NetError, banner: &str) -> ChatError {
        let err = ChatError::from(e);
        if err.is_auth() {
            warn!("Session expired during chat request");
            self.events.emit(ChatEvent::SessionExpired);
        } else {
            warn!(error = %err, banner, "Chat request failed");
            state.error = Some(banner.to_string());
            self.events.error(banner);
        }
        err
    }

    fn lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Screen title for the signed-in user's role.
pub fn title_for(role: &Role) -> &'static str {
    match role {
        Role::Volunteer => "Chat with Event Managers",
        Role::EventManager => "Chat with Volunteers",
        Role::Other => "Chat",
    }
}
