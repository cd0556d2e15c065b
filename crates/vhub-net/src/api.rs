//! REST client for the volunteer-hub backend.
//!
//! Every request carries the session's bearer token. A 401 from any endpoint
//! invalidates the session through [`Credentials::invalidate`] before the
//! error is returned, so every consumer observes the sign-out.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vhub_shared::types::{
    BroadcastRequest, ConversationEntry, CurrentUser, EventId, EventSummary, Message, UserId,
    UserRef, VolunteerSummary,
};

use crate::error::NetError;

/// Source of the bearer credential and sink for session invalidation.
pub trait Credentials: Send + Sync {
    fn bearer_token(&self) -> Option<String>;

    /// Drop the stored credential and cached user.
    fn invalidate(&self);
}

/// Backend operations used by the chat screens.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Counterparts who have exchanged messages with the current user.
    async fn list_counterparts(&self) -> Result<Vec<ConversationEntry>, NetError>;

    /// Full history with one counterpart, in server order.
    async fn fetch_history(&self, counterpart: &UserId) -> Result<Vec<Message>, NetError>;

    /// Send a reply and return the message as created by the server.
    async fn send_reply(&self, recipient: &UserId, text: &str) -> Result<Message, NetError>;

    /// Manager broadcast to several volunteers of one event. All-or-nothing.
    async fn send_broadcast(
        &self,
        request: &BroadcastRequest,
    ) -> Result<serde_json::Value, NetError>;

    /// Events created by the current (manager) user.
    async fn list_created_events(&self) -> Result<Vec<EventSummary>, NetError>;

    async fn list_event_volunteers(
        &self,
        event: &EventId,
    ) -> Result<Vec<VolunteerSummary>, NetError>;

    /// Profile of the user owning the bearer token.
    async fn fetch_profile(&self) -> Result<CurrentUser, NetError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyBody<'a> {
    recipient_id: &'a UserId,
    message: &'a str,
}

/// Shape of one element of `GET /chat/senders`.
#[derive(Deserialize)]
struct CounterpartDto {
    #[serde(rename = "_id")]
    id: UserId,
    #[serde(default)]
    name: String,
    #[serde(rename = "unreadCount", default)]
    unread_count: u32,
}

impl From<CounterpartDto> for ConversationEntry {
    fn from(dto: CounterpartDto) -> Self {
        Self {
            counterpart: UserRef {
                id: dto.id,
                display_name: dto.name,
            },
            unread_count: dto.unread_count,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// HTTP implementation of [`ChatApi`].
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn Credentials>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn Credentials>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.credentials.bearer_token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NetError> {
        debug!(path, "GET");
        let resp = self.authorize(self.http.get(self.url(path))).send().await?;
        self.read_json(path, resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, NetError> {
        debug!(path, "POST");
        let resp = self
            .authorize(self.http.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        self.read_json(path, resp).await
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        path: &str,
        resp: Response,
    ) -> Result<T, NetError> {
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!(path, "Unauthorized request, clearing session");
            self.credentials.invalidate();
            return Err(NetError::Unauthorized);
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            warn!(path, status = status.as_u16(), %message, "Request rejected");
            return Err(NetError::Status {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| NetError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn list_counterparts(&self) -> Result<Vec<ConversationEntry>, NetError> {
        let senders: Vec<CounterpartDto> = self.get_json("/chat/senders").await?;
        Ok(senders.into_iter().map(ConversationEntry::from).collect())
    }

    async fn fetch_history(&self, counterpart: &UserId) -> Result<Vec<Message>, NetError> {
        self.get_json(&format!("/chat/messages/{counterpart}")).await
    }

    async fn send_reply(&self, recipient: &UserId, text: &str) -> Result<Message, NetError> {
        let body = ReplyBody {
            recipient_id: recipient,
            message: text,
        };
        self.post_json("/chat/reply", &body).await
    }

    async fn send_broadcast(
        &self,
        request: &BroadcastRequest,
    ) -> Result<serde_json::Value, NetError> {
        self.post_json("/chat/send", request).await
    }

    async fn list_created_events(&self) -> Result<Vec<EventSummary>, NetError> {
        self.get_json("/events/created").await
    }

    async fn list_event_volunteers(
        &self,
        event: &EventId,
    ) -> Result<Vec<VolunteerSummary>, NetError> {
        self.get_json(&format!("/events/{event}/volunteers")).await
    }

    async fn fetch_profile(&self) -> Result<CurrentUser, NetError> {
        self.get_json("/users/profile").await
    }
}

/// Absolute URLs pass through; relative paths are appended to `base_url`.
pub fn resolve_media_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    struct TestCredentials {
        token: Mutex<Option<String>>,
        invalidated: AtomicBool,
    }

    impl TestCredentials {
        fn with_token(token: &str) -> Arc<Self> {
            Arc::new(Self {
                token: Mutex::new(Some(token.to_string())),
                invalidated: AtomicBool::new(false),
            })
        }
    }

    impl Credentials for TestCredentials {
        fn bearer_token(&self) -> Option<String> {
            self.token.lock().unwrap().clone()
        }

        fn invalidate(&self) {
            *self.token.lock().unwrap() = None;
            self.invalidated.store(true, Ordering::SeqCst);
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn message_json(id: &str, sender: &str, text: &str) -> serde_json::Value {
        json!({
            "_id": id,
            "sender": { "_id": sender, "name": "Someone" },
            "text": text,
            "createdAt": "2024-01-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_bearer_token_attached() {
        let router = Router::new().route(
            "/api/chat/senders",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth != "Bearer secret" {
                    return Err(StatusCode::FORBIDDEN);
                }
                Ok(Json(json!([
                    { "_id": "u1", "name": "Ada", "email": "ada@example.org" },
                    { "_id": "u2", "name": "Bo", "unreadCount": 3 }
                ])))
            }),
        );
        let base = serve(router).await;
        let client = ApiClient::new(base, TestCredentials::with_token("secret"));

        let entries = client.list_counterparts().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].counterpart, UserRef::new("u1", "Ada"));
        assert_eq!(entries[0].unread_count, 0);
        assert_eq!(entries[1].unread_count, 3);
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_session() {
        let router = Router::new().route(
            "/api/chat/messages/:id",
            get(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = serve(router).await;
        let creds = TestCredentials::with_token("expired");
        let client = ApiClient::new(base, creds.clone());

        let err = client.fetch_history(&UserId::from("u1")).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(creds.invalidated.load(Ordering::SeqCst));
        assert!(creds.bearer_token().is_none());
    }

    #[tokio::test]
    async fn test_send_reply_body() {
        let router = Router::new().route(
            "/api/chat/reply",
            post(|Json(body): Json<serde_json::Value>| async move {
                let recipient = body["recipientId"].as_str().unwrap_or_default().to_string();
                let text = body["message"].as_str().unwrap_or_default().to_string();
                assert_eq!(recipient, "u2");
                Json(message_json("m9", "me", &text))
            }),
        );
        let base = serve(router).await;
        let client = ApiClient::new(base, TestCredentials::with_token("t"));

        let msg = client.send_reply(&UserId::from("u2"), "hello").await.unwrap();
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.sender.id, UserId::from("me"));
    }

    #[tokio::test]
    async fn test_error_message_extracted() {
        let router = Router::new().route(
            "/api/chat/send",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "message": "Recipients required" })),
                )
            }),
        );
        let base = serve(router).await;
        let creds = TestCredentials::with_token("t");
        let client = ApiClient::new(base, creds.clone());

        let request = BroadcastRequest {
            event_id: EventId::from("e1"),
            recipients: vec![],
            message: "hi".into(),
            sender_id: UserId::from("m1"),
        };
        match client.send_broadcast(&request).await {
            Err(NetError::Status { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Recipients required");
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!creds.invalidated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_decode_error_on_bad_body() {
        let router = Router::new().route("/api/users/profile", get(|| async { "not json" }));
        let base = serve(router).await;
        let client = ApiClient::new(base, TestCredentials::with_token("t"));

        assert!(matches!(
            client.fetch_profile().await,
            Err(NetError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_network_error_when_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(format!("http://{addr}/api"), TestCredentials::with_token("t"));
        assert!(matches!(
            client.list_created_events().await,
            Err(NetError::Request(_))
        ));
    }

    #[test]
    fn test_media_url() {
        assert_eq!(
            resolve_media_url("https://vms.example.org/api/", "/uploads/a.png"),
            "https://vms.example.org/api/uploads/a.png"
        );
        assert_eq!(
            resolve_media_url("https://vms.example.org/api", "uploads/b.mp4"),
            "https://vms.example.org/api/uploads/b.mp4"
        );
        assert_eq!(
            resolve_media_url("https://vms.example.org/api", "https://cdn.example.org/c.png"),
            "https://cdn.example.org/c.png"
        );
    }
}
