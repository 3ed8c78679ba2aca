//! User settings value type.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FILE_PREVIEW_SIZE_BYTES: u64 = 1024 * 1024;

/// Host color theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTheme {
    Light,
    Dark,
    #[default]
    System,
}

impl std::fmt::Display for ColorTheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorTheme::Light => write!(f, "light"),
            ColorTheme::Dark => write!(f, "dark"),
            ColorTheme::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    timeout: Duration,
    max_file_preview_size_bytes: u64,
    color_theme: ColorTheme,
}

impl Settings {
    /// Build settings. The timeout must be a positive whole number of
    /// seconds and both values must fit the persisted signed fields.
    pub fn new(timeout: Duration, max_file_preview_size_bytes: u64) -> Result<Self, SettingsError> {
        if timeout.is_zero()
            || timeout.subsec_nanos() != 0
            || i64::try_from(timeout.as_secs()).is_err()
        {
            return Err(SettingsError::InvalidTimeout);
        }
        if max_file_preview_size_bytes == 0 || i64::try_from(max_file_preview_size_bytes).is_err() {
            return Err(SettingsError::InvalidMaxPreviewSize);
        }
        Ok(Self {
            timeout,
            max_file_preview_size_bytes,
            color_theme: ColorTheme::default(),
        })
    }

    pub fn with_color_theme(mut self, color_theme: ColorTheme) -> Self {
        self.color_theme = color_theme;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_file_preview_size_bytes(&self) -> u64 {
        self.max_file_preview_size_bytes
    }

    pub fn color_theme(&self) -> ColorTheme {
        self.color_theme
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_file_preview_size_bytes: DEFAULT_MAX_FILE_PREVIEW_SIZE_BYTES,
            color_theme: ColorTheme::System,
        }
    }
}

/// Persisted shape of [`Settings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SettingsDto {
    pub timeout_in_seconds: i64,
    pub max_file_preview_size_bytes: i64,
    #[serde(default)]
    pub color_theme: ColorTheme,
}

impl From<&Settings> for SettingsDto {
    fn from(settings: &Settings) -> Self {
        Self {
            timeout_in_seconds: i64::try_from(settings.timeout.as_secs()).unwrap_or(i64::MAX),
            max_file_preview_size_bytes: i64::try_from(settings.max_file_preview_size_bytes)
                .unwrap_or(i64::MAX),
            color_theme: settings.color_theme,
        }
    }
}

impl TryFrom<SettingsDto> for Settings {
    type Error = SettingsError;

    fn try_from(dto: SettingsDto) -> Result<Self, Self::Error> {
        let timeout = u64::try_from(dto.timeout_in_seconds)
            .map(Duration::from_secs)
            .map_err(|_| SettingsError::InvalidTimeout)?;
        let max_preview = u64::try_from(dto.max_file_preview_size_bytes)
            .map_err(|_| SettingsError::InvalidMaxPreviewSize)?;
        Ok(Settings::new(timeout, max_preview)?.with_color_theme(dto.color_theme))
    }
}
