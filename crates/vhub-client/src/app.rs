//! Composition root: wires the local store, the session, the REST client and
//! the push channel into screens.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{info, warn};

use vhub_net::{spawn_push_channel, ApiClient, ChatApi, PushHandle, PushNotification};
use vhub_shared::types::{CurrentUser, Theme};
use vhub_store::LocalStore;

use crate::broadcast::BroadcastComposer;
use crate::chat::{ChatOptions, ChatScreen};
use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::events::{ChatEvent, EventSink};
use crate::session::{SessionHandle, SessionStore};
use crate::thread::RenderOptions;

pub struct App {
    config: ClientConfig,
    store: Arc<Mutex<LocalStore>>,
    session: SessionHandle,
    api: Arc<ApiClient>,
}

impl App {
    /// Open the local store and load the stored session.
    pub fn open(config: ClientConfig) -> Result<Self, ChatError> {
        let store = match &config.data_dir {
            Some(dir) => LocalStore::open_in_dir(dir)?,
            None => LocalStore::new()?,
        };
        info!(path = ?store.path(), "Local store opened");

        let store = Arc::new(Mutex::new(store));
        let session = SessionHandle::load(store.clone() as Arc<dyn SessionStore>);
        let api = Arc::new(ApiClient::new(
            config.api_url.clone(),
            Arc::new(session.clone()),
        ));

        Ok(Self {
            config,
            store,
            session,
            api,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn api(&self) -> Arc<dyn ChatApi> {
        self.api.clone()
    }

    pub fn sign_in(&self, token: impl Into<String>, user: CurrentUser) {
        self.session.sign_in(token, user);
    }

    pub fn sign_out(&self) {
        self.session.invalidate();
    }

    /// Validate the stored token against the backend.
    pub async fn restore_session(&self) -> Option<CurrentUser> {
        self.session.restore(self.api.as_ref()).await
    }

    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            filter_self_echo: self.config.filter_self_echo,
            render: RenderOptions {
                utc_offset: self.config.utc_offset(),
                media_base_url: self.api.base_url().to_string(),
            },
        }
    }

    /// Connect a push channel authenticated with the current token.
    pub fn spawn_push(&self) -> (PushHandle, mpsc::Receiver<PushNotification>) {
        spawn_push_channel(self.config.push_config(self.session.token()))
    }

    /// Create and mount the chat screen. A failed directory load leaves the
    /// screen usable with an error banner; an expired session does not.
    pub async fn chat_screen(
        &self,
    ) -> Result<(ChatScreen, mpsc::UnboundedReceiver<ChatEvent>), ChatError> {
        let (sink, events) = EventSink::channel();
        let screen = ChatScreen::new(self.api(), self.session.clone(), sink, self.chat_options())?;

        let (push, notifications) = self.spawn_push();
        if let Err(e) = screen.mount(push, notifications).await {
            if e.is_auth() || matches!(e, ChatError::Network(vhub_net::NetError::ChannelClosed)) {
                screen.unmount().await;
                return Err(e);
            }
            warn!(error = %e, "Chat screen mounted with errors");
        }

        Ok((screen, events))
    }

    /// Broadcast form with the manager's events loaded.
    pub async fn broadcast_composer(&self) -> Result<BroadcastComposer, ChatError> {
        let mut composer = BroadcastComposer::new();
        composer.load_events(self.api.as_ref()).await?;
        Ok(composer)
    }

    pub async fn send_broadcast(
        &self,
        composer: &mut BroadcastComposer,
        push: Option<&PushHandle>,
    ) -> Result<serde_json::Value, ChatError> {
        composer.submit(self.api.as_ref(), &self.session, push).await
    }

    pub fn theme(&self) -> Result<Theme, ChatError> {
        Ok(self.store().theme()?)
    }

    pub fn toggle_theme(&self) -> Result<Theme, ChatError> {
        let store = self.store();
        let theme = store.theme()?.toggled();
        store.set_theme(theme)?;
        info!(theme = theme.as_str(), "Theme changed");
        Ok(theme)
    }

    fn store(&self) -> std::sync::MutexGuard<'_, LocalStore> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::volunteer;

    fn config_in(dir: &tempfile::TempDir) -> ClientConfig {
        ClientConfig {
            api_url: "http://127.0.0.1:1/api".into(),
            socket_url: "http://127.0.0.1:1".into(),
            data_dir: Some(dir.path().to_path_buf()),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_session_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let app = App::open(config_in(&dir)).unwrap();
            app.sign_in("tok", volunteer());
        }

        let app = App::open(config_in(&dir)).unwrap();
        assert_eq!(app.session().token().as_deref(), Some("tok"));
        assert_eq!(app.session().current_user(), Some(volunteer()));
    }

    #[test]
    fn test_theme_toggle_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let app = App::open(config_in(&dir)).unwrap();
            assert_eq!(app.theme().unwrap(), Theme::Light);
            assert_eq!(app.toggle_theme().unwrap(), Theme::Dark);
        }

        let app = App::open(config_in(&dir)).unwrap();
        assert_eq!(app.theme().unwrap(), Theme::Dark);
    }

    #[tokio::test]
    async fn test_restore_failure_clears_stored_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(config_in(&dir)).unwrap();
        app.sign_in("tok", volunteer());

        assert!(app.restore_session().await.is_none());
        assert!(!app.session().is_signed_in());

        let reopened = App::open(config_in(&dir)).unwrap();
        assert!(reopened.session().token().is_none());
    }

    #[tokio::test]
    async fn test_chat_screen_requires_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(config_in(&dir)).unwrap();
        assert!(app.chat_screen().await.is_err());
    }

    #[test]
    fn test_chat_options_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.filter_self_echo = false;
        config.utc_offset_minutes = 120;
        let app = App::open(config).unwrap();

        let options = app.chat_options();
        assert!(!options.filter_self_echo);
        assert_eq!(options.render.utc_offset.local_minus_utc(), 7200);
        assert_eq!(options.render.media_base_url, "http://127.0.0.1:1/api");
    }
}
