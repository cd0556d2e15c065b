//! The signed-in session shared by the transport client and every screen.
//!
//! [`SessionHandle`] is the single owner of the bearer token and the cached
//! user. Invalidation goes through [`SessionHandle::invalidate`] only, which
//! clears memory and storage and notifies subscribers.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use vhub_net::{ChatApi, Credentials};
use vhub_shared::types::{CurrentUser, Role, UserId};
use vhub_store::{LocalStore, StoreError, StoredSession};

/// Persistence of the session between runs.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredSession>, StoreError>;
    fn save(&self, session: &StoredSession) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

impl SessionStore for Mutex<LocalStore> {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .load_session()
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .save_session(session)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear_session()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    user: Option<CurrentUser>,
}

struct Inner {
    state: RwLock<SessionState>,
    store: Option<Arc<dyn SessionStore>>,
    /// Bumped on every sign-in and invalidation.
    changes: watch::Sender<u64>,
}

/// Cloneable handle to the session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("signed_in", &self.is_signed_in())
            .field("user", &self.user_id())
            .finish()
    }
}

impl SessionHandle {
    /// Memory-only session.
    pub fn new() -> Self {
        Self::with_store(None, SessionState::default())
    }

    /// Session backed by `store`, initialised from whatever it holds.
    pub fn load(store: Arc<dyn SessionStore>) -> Self {
        let state = match store.load() {
            Ok(Some(stored)) => {
                debug!(has_user = stored.user.is_some(), "Loaded stored session");
                SessionState {
                    token: Some(stored.token),
                    user: stored.user,
                }
            }
            Ok(None) => SessionState::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load stored session");
                SessionState::default()
            }
        };
        Self::with_store(Some(store), state)
    }

    fn with_store(store: Option<Arc<dyn SessionStore>>, state: SessionState) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(state),
                store,
                changes,
            }),
        }
    }

    pub fn sign_in(&self, token: impl Into<String>, user: CurrentUser) {
        let stored = StoredSession {
            token: token.into(),
            user: Some(user),
        };
        self.persist(&stored);

        info!(user = %stored.user.as_ref().map(|u| u.id.short()).unwrap_or_default(), "Signed in");
        {
            let mut state = self.write();
            state.token = Some(stored.token);
            state.user = stored.user;
        }
        self.notify();
    }

    /// Replace the cached user, keeping the token.
    pub fn set_user(&self, user: CurrentUser) {
        let token = {
            let mut state = self.write();
            state.user = Some(user.clone());
            state.token.clone()
        };
        if let Some(token) = token {
            self.persist(&StoredSession {
                token,
                user: Some(user),
            });
        }
    }

    /// Clear the token and cached user in memory and storage.
    pub fn invalidate(&self) {
        let was_signed_in = {
            let mut state = self.write();
            let was = state.token.is_some();
            *state = SessionState::default();
            was
        };

        if let Some(store) = &self.inner.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to clear stored session");
            }
        }

        if was_signed_in {
            info!("Session invalidated");
            self.notify();
        }
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.read().user.clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.read().user.as_ref().map(|u| u.id.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.read().user.as_ref().map(|u| u.role.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.read().token.is_some()
    }

    /// Receiver that changes on every sign-in and invalidation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    /// Re-validate a stored token by fetching the profile. Any failure signs
    /// the user out.
    pub async fn restore(&self, api: &dyn ChatApi) -> Option<CurrentUser> {
        if !self.is_signed_in() {
            return None;
        }

        match api.fetch_profile().await {
            Ok(user) => {
                debug!(user = %user.id.short(), "Session restored");
                self.set_user(user.clone());
                Some(user)
            }
            Err(e) => {
                warn!(error = %e, "Failed to restore session");
                self.invalidate();
                None
            }
        }
    }

    fn persist(&self, stored: &StoredSession) {
        if let Some(store) = &self.inner.store {
            if let Err(e) = store.save(stored) {
                warn!(error = %e, "Failed to persist session");
            }
        }
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Credentials for SessionHandle {
    fn bearer_token(&self) -> Option<String> {
        self.token()
    }

    fn invalidate(&self) {
        SessionHandle::invalidate(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{manager, volunteer, FakeApi};

    fn stored_handle() -> (SessionHandle, Arc<Mutex<LocalStore>>) {
        let store = Arc::new(Mutex::new(LocalStore::open_in_memory().unwrap()));
        let handle = SessionHandle::load(store.clone());
        (handle, store)
    }

    #[test]
    fn test_sign_in_persists() {
        let (handle, store) = stored_handle();
        handle.sign_in("tok", volunteer());

        assert_eq!(handle.token().as_deref(), Some("tok"));
        assert_eq!(handle.role(), Some(Role::Volunteer));

        let reloaded = SessionHandle::load(store);
        assert_eq!(reloaded.token().as_deref(), Some("tok"));
        assert_eq!(reloaded.current_user(), Some(volunteer()));
    }

    #[test]
    fn test_invalidate_clears_memory_and_storage() {
        let (handle, store) = stored_handle();
        handle.sign_in("tok", manager());
        let changes = handle.subscribe();

        Credentials::invalidate(&handle);

        assert!(!handle.is_signed_in());
        assert!(handle.current_user().is_none());
        assert!(store.lock().unwrap().load_session().unwrap().is_none());
        assert!(changes.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_restore_refreshes_user() {
        let (handle, store) = stored_handle();
        handle.sign_in("tok", volunteer());

        let mut fresh = volunteer();
        fresh.name = "Ada Lovelace".into();
        let api = FakeApi::new();
        api.set_profile(Ok(fresh.clone()));

        assert_eq!(handle.restore(&api).await, Some(fresh.clone()));
        let stored = store.lock().unwrap().load_session().unwrap().unwrap();
        assert_eq!(stored.user, Some(fresh));
    }

    #[tokio::test]
    async fn test_restore_failure_signs_out() {
        let (handle, _store) = stored_handle();
        handle.sign_in("tok", volunteer());

        let api = FakeApi::new();
        api.set_profile(Err(vhub_net::NetError::Unauthorized));

        assert_eq!(handle.restore(&api).await, None);
        assert!(!handle.is_signed_in());
    }

    #[tokio::test]
    async fn test_restore_without_token_skips_request() {
        let handle = SessionHandle::new();
        let api = FakeApi::new();
        assert_eq!(handle.restore(&api).await, None);
        assert_eq!(api.calls("fetch_profile"), 0);
    }
}
