//! In-memory backend and fixtures for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Notify;

use vhub_net::{ChatApi, Credentials, NetError};
use vhub_shared::types::{
    BroadcastRequest, ConversationEntry, CurrentUser, EventId, EventSummary, Message, MessageId,
    Role, UserId, UserRef, VolunteerSummary,
};

pub fn user(id: &str) -> UserRef {
    UserRef::new(id, id.to_uppercase())
}

pub fn entry(id: &str, unread: u32) -> ConversationEntry {
    ConversationEntry {
        counterpart: user(id),
        unread_count: unread,
    }
}

pub fn message_at(sender: &str, id: &str, created_at: &str) -> Message {
    Message {
        id: MessageId::from(id),
        sender: user(sender),
        text: format!("text of {id}"),
        created_at: created_at.parse::<DateTime<Utc>>().unwrap(),
        media: None,
    }
}

pub fn message_from(sender: &str, id: &str) -> Message {
    message_at(sender, id, "2024-01-01T10:00:00Z")
}

pub fn volunteer() -> CurrentUser {
    CurrentUser {
        id: UserId::from("me"),
        name: "Ada".into(),
        email: "ada@example.org".into(),
        role: Role::Volunteer,
    }
}

pub fn manager() -> CurrentUser {
    CurrentUser {
        id: UserId::from("mgr"),
        name: "Grace".into(),
        email: "grace@example.org".into(),
        role: Role::EventManager,
    }
}

/// Scriptable [`ChatApi`]. Failures are one-shot: the next call after a
/// failure succeeds again.
#[derive(Default)]
pub struct FakeApi {
    counterparts: Mutex<Vec<ConversationEntry>>,
    histories: Mutex<HashMap<UserId, Vec<Message>>>,
    volunteers: Mutex<Vec<VolunteerSummary>>,
    profile: Mutex<Option<Result<CurrentUser, NetError>>>,
    failures: Mutex<HashMap<&'static str, NetError>>,
    gates: Mutex<HashMap<UserId, Arc<Notify>>>,
    broadcasts: Mutex<Vec<BroadcastRequest>>,
    replies: Mutex<Vec<(UserId, String)>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    credentials: Mutex<Option<Arc<dyn Credentials>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulate the HTTP client: a 401 invalidates these credentials.
    pub fn with_credentials(self, credentials: Arc<dyn Credentials>) -> Self {
        *self.credentials.lock().unwrap() = Some(credentials);
        self
    }

    pub fn set_counterparts(&self, entries: Vec<ConversationEntry>) {
        *self.counterparts.lock().unwrap() = entries;
    }

    pub fn set_history(&self, counterpart: &str, messages: Vec<Message>) {
        self.histories
            .lock()
            .unwrap()
            .insert(UserId::from(counterpart), messages);
    }

    pub fn set_volunteers(&self, volunteers: Vec<VolunteerSummary>) {
        *self.volunteers.lock().unwrap() = volunteers;
    }

    pub fn set_profile(&self, profile: Result<CurrentUser, NetError>) {
        *self.profile.lock().unwrap() = Some(profile);
    }

    pub fn fail(&self, operation: &'static str, error: NetError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    pub fn fail_broadcast(&self, error: NetError) {
        self.fail("send_broadcast", error);
    }

    /// History requests for `counterpart` block until the returned gate is
    /// notified.
    pub fn gate_history(&self, counterpart: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(UserId::from(counterpart), gate.clone());
        gate
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub async fn wait_for_calls(&self, operation: &str, count: usize) {
        for _ in 0..1000 {
            if self.calls(operation) >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("{operation} was not called {count} times");
    }

    pub fn last_broadcast(&self) -> Option<BroadcastRequest> {
        self.broadcasts.lock().unwrap().last().cloned()
    }

    pub fn replies(&self) -> Vec<(UserId, String)> {
        self.replies.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str) -> Result<(), NetError> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        match self.failures.lock().unwrap().remove(operation) {
            Some(NetError::Unauthorized) => {
                if let Some(credentials) = self.credentials.lock().unwrap().as_ref() {
                    credentials.invalidate();
                }
                Err(NetError::Unauthorized)
            }
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_counterparts(&self) -> Result<Vec<ConversationEntry>, NetError> {
        self.record("list_counterparts")?;
        Ok(self.counterparts.lock().unwrap().clone())
    }

    async fn fetch_history(&self, counterpart: &UserId) -> Result<Vec<Message>, NetError> {
        let gate = self.gates.lock().unwrap().get(counterpart).cloned();
        let result = self.record("fetch_history");
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result?;
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(counterpart)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_reply(&self, recipient: &UserId, text: &str) -> Result<Message, NetError> {
        self.record("send_reply")?;
        let mut replies = self.replies.lock().unwrap();
        replies.push((recipient.clone(), text.to_string()));
        Ok(Message {
            id: MessageId(format!("reply-{}", replies.len())),
            sender: volunteer().as_user_ref(),
            text: text.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap(),
            media: None,
        })
    }

    async fn send_broadcast(&self, request: &BroadcastRequest) -> Result<Value, NetError> {
        self.record("send_broadcast")?;
        self.broadcasts.lock().unwrap().push(request.clone());
        Ok(json!({ "success": true, "count": request.recipients.len() }))
    }

    async fn list_created_events(&self) -> Result<Vec<EventSummary>, NetError> {
        self.record("list_created_events")?;
        Ok(vec![EventSummary {
            id: EventId::from("e1"),
            title: "Beach cleanup".into(),
        }])
    }

    async fn list_event_volunteers(
        &self,
        _event: &EventId,
    ) -> Result<Vec<VolunteerSummary>, NetError> {
        self.record("list_event_volunteers")?;
        Ok(self.volunteers.lock().unwrap().clone())
    }

    async fn fetch_profile(&self) -> Result<CurrentUser, NetError> {
        self.record("fetch_profile")?;
        match self.profile.lock().unwrap().take() {
            Some(Ok(user)) => Ok(user),
            Some(Err(NetError::Unauthorized)) => {
                if let Some(credentials) = self.credentials.lock().unwrap().as_ref() {
                    credentials.invalidate();
                }
                Err(NetError::Unauthorized)
            }
            Some(Err(e)) => Err(e),
            None => Ok(volunteer()),
        }
    }
}
