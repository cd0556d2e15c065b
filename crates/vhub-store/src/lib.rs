//! # vhub-store
//!
//! Client-local storage for the volunteer-hub client, backed by SQLite.
//!
//! Only what the browser client kept in local storage lives here: the
//! session token, the cached user object and the theme preference. Messages
//! are never persisted locally; the server is the record.

pub mod database;
pub mod items;
pub mod migrations;
pub mod models;
pub mod preferences;
pub mod session;

mod error;

pub use database::LocalStore;
pub use error::StoreError;
pub use models::*;
