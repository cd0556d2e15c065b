//! Raw key/value access, the equivalent of the browser's local storage.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::LocalStore;
use crate::error::Result;

impl LocalStore {
    pub fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM local_items WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO local_items (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Returns `true` if a value was removed.
    pub fn remove_item(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM local_items WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_and_remove_reports() {
        let store = LocalStore::open_in_memory().unwrap();
        assert_eq!(store.get_item("k").unwrap(), None);

        store.set_item("k", "a").unwrap();
        store.set_item("k", "b").unwrap();
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("b"));

        assert!(store.remove_item("k").unwrap());
        assert!(!store.remove_item("k").unwrap());
    }
}
