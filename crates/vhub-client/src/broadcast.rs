//! Manager broadcast: one message to several volunteers of an event.
//!
//! The broadcast either reaches every selected recipient or fails as a whole.
//! After the server accepted it, recipients are notified through the push
//! channel with a `sendMessage` event.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use vhub_net::{ChatApi, NetError, PushHandle};
use vhub_shared::constants::EVENT_SEND_MESSAGE;
use vhub_shared::types::{BroadcastRequest, EventId, EventSummary, Role, UserId, VolunteerSummary};

use crate::error::{ChatError, ValidationError};
use crate::session::SessionHandle;

#[derive(Debug, Default)]
pub struct BroadcastComposer {
    events: Vec<EventSummary>,
    event: Option<EventId>,
    volunteers: Vec<VolunteerSummary>,
    recipients: BTreeSet<UserId>,
    select_all: bool,
    text: String,
    busy: bool,
    error: Option<String>,
}

impl BroadcastComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load_events(&mut self, api: &dyn ChatApi) -> Result<(), ChatError> {
        self.error = None;
        match api.list_created_events().await {
            Ok(events) => {
                debug!(count = events.len(), "Loaded created events");
                self.events = events;
                Ok(())
            }
            Err(e) => {
                self.error = Some("Failed to load events".to_string());
                Err(e.into())
            }
        }
    }

    /// Choose the event to broadcast for and load its volunteers. The
    /// recipient selection is cleared either way.
    pub async fn select_event(
        &mut self,
        api: &dyn ChatApi,
        event: Option<EventId>,
    ) -> Result<(), ChatError> {
        self.event = event.clone();
        self.volunteers.clear();
        self.recipients.clear();
        self.select_all = false;

        let Some(event) = event else {
            return Ok(());
        };

        self.error = None;
        match api.list_event_volunteers(&event).await {
            Ok(volunteers) => {
                debug!(event = %event, count = volunteers.len(), "Loaded event volunteers");
                self.volunteers = volunteers;
                Ok(())
            }
            Err(e) => {
                self.error = Some("Failed to load volunteers".to_string());
                Err(e.into())
            }
        }
    }

    pub fn toggle_volunteer(&mut self, id: &UserId) {
        if !self.recipients.remove(id) {
            self.recipients.insert(id.clone());
        }
        self.select_all =
            !self.volunteers.is_empty() && self.recipients.len() == self.volunteers.len();
    }

    pub fn toggle_select_all(&mut self) {
        if self.select_all {
            self.recipients.clear();
        } else {
            self.recipients = self.volunteers.iter().map(|v| v.id.clone()).collect();
        }
        self.select_all = !self.select_all;
    }

    pub fn compose(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Send the broadcast. On success the text and recipients are cleared
    /// and the server's response is returned.
    pub async fn submit(
        &mut self,
        api: &dyn ChatApi,
        session: &SessionHandle,
        push: Option<&PushHandle>,
    ) -> Result<Value, ChatError> {
        let request = match self.validate(session) {
            Ok(request) => request,
            Err(e) => {
                self.error = Some(validation_message(&e).to_string());
                return Err(e.into());
            }
        };

        self.busy = true;
        self.error = None;
        let result = api.send_broadcast(&request).await;
        self.busy = false;

        match result {
            Ok(response) => {
                info!(
                    event = %request.event_id,
                    recipients = request.recipients.len(),
                    "Broadcast sent"
                );
                if let Some(push) = push {
                    let payload = with_sender(response.clone(), &request.sender_id);
                    if let Err(e) = push.emit(EVENT_SEND_MESSAGE, payload).await {
                        warn!(error = %e, "Failed to notify recipients over push channel");
                    }
                }
                self.text.clear();
                self.recipients.clear();
                self.select_all = false;
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "Broadcast failed");
                self.error = Some(send_failure_message(&e));
                Err(e.into())
            }
        }
    }

    fn validate(&self, session: &SessionHandle) -> Result<BroadcastRequest, ValidationError> {
        if self.busy {
            return Err(ValidationError::Busy);
        }
        let user = match (session.is_signed_in(), session.current_user()) {
            (true, Some(user)) => user,
            _ => return Err(ValidationError::NotSignedIn),
        };
        if user.role != Role::EventManager {
            return Err(ValidationError::NotEventManager);
        }
        let event_id = self.event.clone().ok_or(ValidationError::NoEvent)?;
        if self.recipients.is_empty() {
            return Err(ValidationError::NoRecipients);
        }
        let message = self.text.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyText);
        }

        Ok(BroadcastRequest {
            event_id,
            recipients: self.recipients.iter().cloned().collect(),
            message: message.to_string(),
            sender_id: user.id,
        })
    }

    pub fn events(&self) -> &[EventSummary] {
        &self.events
    }

    pub fn event(&self) -> Option<&EventId> {
        self.event.as_ref()
    }

    pub fn volunteers(&self) -> &[VolunteerSummary] {
        &self.volunteers
    }

    pub fn recipients(&self) -> &BTreeSet<UserId> {
        &self.recipients
    }

    pub fn is_all_selected(&self) -> bool {
        self.select_all
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Banner text of the last failure, cleared when a new request starts.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Server response with `sender._id` set, as recipients expect it.
fn with_sender(response: Value, sender: &UserId) -> Value {
    let mut payload = match response {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    payload.insert("sender".to_string(), json!({ "_id": sender }));
    Value::Object(payload)
}

fn validation_message(e: &ValidationError) -> &'static str {
    match e {
        ValidationError::NotSignedIn => "You must be logged in to send messages",
        ValidationError::NotEventManager => "Only event managers can send messages to volunteers",
        ValidationError::Busy => "A message is already being sent",
        _ => "Please select an event, at least one volunteer, and enter a message",
    }
}

fn send_failure_message(e: &NetError) -> String {
    match e {
        NetError::Unauthorized => {
            "You are not authorized to send messages. Please log in again.".to_string()
        }
        NetError::Status { status: 400, message } => message.clone(),
        NetError::Status { status: 500, .. } => {
            "Server error occurred. Please try again later.".to_string()
        }
        NetError::Status { message, .. } if !message.is_empty() => message.clone(),
        _ => "Failed to send message. Please try again.".to_string(),
    }
}
