use std::sync::Arc;
use std::time::Duration;

use crate::binding::Binding;
use crate::errors::CoreError;
use crate::repository::SettingsRepository;
use crate::settings::{ColorTheme, Settings};

/// Applies a color theme to the host UI.
pub trait ThemeHost: Send + Sync {
    fn apply_theme(&self, theme: ColorTheme);
}

/// Current settings, shared with the view-models that read them.
pub type SettingsHandle = Arc<Binding<Settings>>;

pub struct SettingsViewModel {
    repo: SettingsRepository,
    host: Arc<dyn ThemeHost>,
    settings: SettingsHandle,
}

impl SettingsViewModel {
    /// Load the stored settings and apply their theme.
    pub fn new(repo: SettingsRepository, host: Arc<dyn ThemeHost>) -> Self {
        let settings = repo.get();
        host.apply_theme(settings.color_theme());
        Self {
            repo,
            host,
            settings: Arc::new(Binding::new(settings)),
        }
    }

    pub fn settings(&self) -> SettingsHandle {
        self.settings.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.settings.with(Settings::timeout)
    }

    pub fn max_preview_size(&self) -> u64 {
        self.settings.with(Settings::max_file_preview_size_bytes)
    }

    pub fn color_theme(&self) -> ColorTheme {
        self.settings.with(Settings::color_theme)
    }

    /// Validate, persist and apply new settings.
    pub fn save(
        &self,
        timeout: Duration,
        max_preview_size: u64,
        color_theme: ColorTheme,
    ) -> Result<(), CoreError> {
        let settings = Settings::new(timeout, max_preview_size)?.with_color_theme(color_theme);
        self.repo.save(&settings)?;
        self.settings.set(settings);
        self.host.apply_theme(color_theme);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::preferences::MemoryPreferences;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        applied: Mutex<Vec<ColorTheme>>,
    }

    impl ThemeHost for RecordingHost {
        fn apply_theme(&self, theme: ColorTheme) {
            self.applied.lock().unwrap().push(theme);
        }
    }

    #[test]
    fn save_persists_and_applies_theme() {
        let prefs = Arc::new(MemoryPreferences::new());
        let host = Arc::new(RecordingHost::default());
        let vm = SettingsViewModel::new(SettingsRepository::new(prefs.clone()), host.clone());
        assert_eq!(vm.timeout(), Duration::from_secs(30));

        vm.save(Duration::from_secs(10), 2048, ColorTheme::Dark)
            .unwrap();
        assert_eq!(vm.timeout(), Duration::from_secs(10));
        assert_eq!(vm.max_preview_size(), 2048);
        assert_eq!(vm.color_theme(), ColorTheme::Dark);
        assert_eq!(
            *host.applied.lock().unwrap(),
            vec![ColorTheme::System, ColorTheme::Dark]
        );

        let reloaded = SettingsViewModel::new(SettingsRepository::new(prefs), host);
        assert_eq!(reloaded.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let prefs = Arc::new(MemoryPreferences::new());
        let vm = SettingsViewModel::new(
            SettingsRepository::new(prefs),
            Arc::new(RecordingHost::default()),
        );
        let err = vm
            .save(Duration::ZERO, 10, ColorTheme::Light)
            .unwrap_err();
        assert!(err.is(ErrorKind::InvalidSettings));
        let err = vm
            .save(Duration::from_millis(500), 10, ColorTheme::Light)
            .unwrap_err();
        assert!(err.is(ErrorKind::InvalidSettings));
        assert_eq!(vm.settings().get(), Settings::default());
    }
}
