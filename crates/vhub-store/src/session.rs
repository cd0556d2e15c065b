//! Persistence of the signed-in session (token + cached user).

use vhub_shared::constants::{STORAGE_KEY_TOKEN, STORAGE_KEY_USER};
use vhub_shared::types::CurrentUser;

use crate::database::LocalStore;
use crate::error::Result;
use crate::models::StoredSession;

impl LocalStore {
    /// Load the stored session. A corrupt user object is dropped with a
    /// warning; the token alone is still a usable session.
    pub fn load_session(&self) -> Result<Option<StoredSession>> {
        let Some(token) = self.get_item(STORAGE_KEY_TOKEN)? else {
            return Ok(None);
        };

        let user = match self.get_item(STORAGE_KEY_USER)? {
            Some(json) => match serde_json::from_str::<CurrentUser>(&json) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding corrupt cached user");
                    None
                }
            },
            None => None,
        };

        Ok(Some(StoredSession { token, user }))
    }

    pub fn save_session(&self, session: &StoredSession) -> Result<()> {
        self.set_item(STORAGE_KEY_TOKEN, &session.token)?;
        match &session.user {
            Some(user) => self.set_item(STORAGE_KEY_USER, &serde_json::to_string(user)?)?,
            None => {
                self.remove_item(STORAGE_KEY_USER)?;
            }
        }
        Ok(())
    }

    /// Remove token and cached user.
    pub fn clear_session(&self) -> Result<()> {
        self.remove_item(STORAGE_KEY_TOKEN)?;
        self.remove_item(STORAGE_KEY_USER)?;
        Ok(())
    }
}
