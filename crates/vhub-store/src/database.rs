//! Connection management.
//!
//! The [`LocalStore`] struct owns a [`rusqlite::Connection`] and guarantees
//! that migrations are run before any other operation.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

const DB_FILE_NAME: &str = "vhub.db";

/// Wrapper around a [`rusqlite::Connection`].
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    /// Open (or create) the store in the platform data directory:
    /// - Linux:   `~/.local/share/vhub/vhub.db`
    /// - macOS:   `~/Library/Application Support/org.vhub.vhub/vhub.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\vhub\vhub\data\vhub.db`
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("org", "vhub", "vhub").ok_or(StoreError::NoDataDir)?;
        Self::open_in_dir(project_dirs.data_dir())
    }

    /// Open (or create) the store file inside `dir`, creating the directory.
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Self::open_at(&dir.join(DB_FILE_NAME))
    }

    /// Open (or create) a store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening local store");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Volatile store, for tests and sessions that must not touch disk.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}
