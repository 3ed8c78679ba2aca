//! Settings persistence in the preferences store.

use std::sync::Arc;

use crate::errors::CoreError;
use crate::preferences::Preferences;
use crate::settings::{Settings, SettingsDto};

pub const SETTINGS_KEY: &str = "settings";

pub struct SettingsRepository {
    prefs: Arc<dyn Preferences>,
}

impl SettingsRepository {
    pub fn new(prefs: Arc<dyn Preferences>) -> Self {
        Self { prefs }
    }

    /// Stored settings, or the defaults when nothing usable is stored.
    pub fn get(&self) -> Settings {
        let raw = self.prefs.string(SETTINGS_KEY);
        if raw.trim().is_empty() {
            return Settings::default();
        }
        let parsed = serde_json::from_str::<SettingsDto>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|dto| Settings::try_from(dto).map_err(|e| e.to_string()));
        match parsed {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!("invalid stored settings, using defaults: {}", err);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), CoreError> {
        let json = serde_json::to_string(&SettingsDto::from(settings))
            .map_err(|e| CoreError::Technical(format!("failed to serialize settings: {e}")))?;
        self.prefs
            .set_string(SETTINGS_KEY, &json)
            .map_err(|e| CoreError::Technical(format!("failed to save settings: {e}")))?;
        tracing::info!(
            "saved settings (timeout {:?}, max preview {} bytes, theme {})",
            settings.timeout(),
            settings.max_file_preview_size_bytes(),
            settings.color_theme()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferences;
    use crate::settings::ColorTheme;
    use std::time::Duration;

    #[test]
    fn missing_or_broken_settings_use_defaults() {
        let prefs = Arc::new(MemoryPreferences::new());
        let repo = SettingsRepository::new(prefs.clone());
        assert_eq!(repo.get(), Settings::default());

        prefs.set_string(SETTINGS_KEY, "{oops").unwrap();
        assert_eq!(repo.get(), Settings::default());

        prefs
            .set_string(
                SETTINGS_KEY,
                r#"{"timeoutInSeconds":0,"maxFilePreviewSizeBytes":10,"colorTheme":"dark"}"#,
            )
            .unwrap();
        assert_eq!(repo.get(), Settings::default());
    }

    #[test]
    fn save_then_get() {
        let prefs = Arc::new(MemoryPreferences::new());
        let repo = SettingsRepository::new(prefs.clone());
        let settings = Settings::new(Duration::from_secs(5), 4096)
            .unwrap()
            .with_color_theme(ColorTheme::Light);
        repo.save(&settings).unwrap();
        assert_eq!(repo.get(), settings);
        assert!(prefs.string(SETTINGS_KEY).contains("\"timeoutInSeconds\":5"));
    }
}
