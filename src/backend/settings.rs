use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

pub const API_URL_ENV: &str = "MANGA_LITE_API_URL";
const PROXY_HOST_MARKER: &str = "script.google.com";

pub fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("manga-lite-tui")
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("URL must not be empty")]
    Empty,
    #[error("not a valid http(s) URL")]
    InvalidUrl,
    #[error("URL must match standard Google Script format")]
    UnrecognisedProxy,
    #[error("failed to write settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Checks that `input` looks like a deployed proxy URL and returns it trimmed.
pub fn validate_api_url(input: &str) -> Result<String, SettingsError> {
    let url = input.trim();
    if url.is_empty() {
        return Err(SettingsError::Empty);
    }

    let parsed = reqwest::Url::parse(url).map_err(|_| SettingsError::InvalidUrl)?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(SettingsError::InvalidUrl);
    }
    if !url.contains(PROXY_HOST_MARKER) {
        return Err(SettingsError::UnrecognisedProxy);
    }

    Ok(url.to_string())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(skip)]
    path: PathBuf,
    #[serde(skip)]
    env_override: Option<String>,
}

impl Settings {
    pub fn load() -> Self {
        let mut settings = Self::load_from(app_config_dir().join("settings.json"));

        if let Ok(value) = std::env::var(API_URL_ENV) {
            match validate_api_url(&value) {
                Ok(url) => settings.env_override = Some(url),
                Err(e) => log::warn!("ignoring {API_URL_ENV}: {e}"),
            }
        }
        settings
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let mut settings = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<Settings>(&content).ok())
            .unwrap_or_default();
        settings.path = path;

        // A hand-edited file may hold something the form would have rejected.
        if let Some(url) = settings.api_url.take() {
            match validate_api_url(&url) {
                Ok(url) => settings.api_url = Some(url),
                Err(e) => log::warn!("ignoring stored API URL: {e}"),
            }
        }
        settings
    }

    /// The base URL in effect for this session, if any.
    pub fn effective_api_url(&self) -> Option<&str> {
        self.env_override
            .as_deref()
            .or(self.api_url.as_deref())
    }

    /// Validates and persists a new base URL. An environment override stops
    /// applying once the user saves one explicitly.
    pub fn set_api_url(&mut self, input: &str) -> Result<(), SettingsError> {
        let url = validate_api_url(input)?;
        self.api_url = Some(url);
        self.env_override = None;
        self.save()?;
        log::info!("proxy URL updated");
        Ok(())
    }

    fn save(&self) -> Result<(), SettingsError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}
