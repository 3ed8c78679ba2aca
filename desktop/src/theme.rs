use std::sync::{Mutex, PoisonError};

use bucketdeck_core::settings::ColorTheme;
use bucketdeck_core::viewmodel::ThemeHost;

/// Theme host for the terminal front end: records the active theme and
/// logs changes.
#[derive(Default)]
pub struct ConsoleTheme {
    current: Mutex<Option<ColorTheme>>,
}

impl ConsoleTheme {
    pub fn current(&self) -> Option<ColorTheme> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ThemeHost for ConsoleTheme {
    fn apply_theme(&self, theme: ColorTheme) {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(theme);
        if previous != Some(theme) {
            tracing::info!("Applied {} theme", theme);
        }
    }
}
