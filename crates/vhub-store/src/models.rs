//! Records kept in client-local storage.

use serde::{Deserialize, Serialize};

use vhub_shared::types::CurrentUser;

/// Credential and cached identity of the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    /// Bearer token attached to every REST call.
    pub token: String,
    /// Last known profile. `None` when only the token survived.
    pub user: Option<CurrentUser>,
}
