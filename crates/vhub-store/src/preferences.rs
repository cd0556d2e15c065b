use vhub_shared::constants::STORAGE_KEY_THEME;
use vhub_shared::types::Theme;

use crate::database::LocalStore;
use crate::error::Result;

impl LocalStore {
    /// Stored theme, `Light` when unset or unrecognised.
    pub fn theme(&self) -> Result<Theme> {
        Ok(self
            .get_item(STORAGE_KEY_THEME)?
            .as_deref()
            .and_then(Theme::parse)
            .unwrap_or_default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.set_item(STORAGE_KEY_THEME, theme.as_str())
    }
}
