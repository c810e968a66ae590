use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use godman_core::{Edition, Scope};
use serde::Deserialize;

const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// User defaults from `config.toml`. Command-line flags win over every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) default_scope: Scope,
    pub(crate) default_edition: Edition,
    pub(crate) create_desktop_shortcut: bool,
    pub(crate) download_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_scope: Scope::User,
            default_edition: Edition::Standard,
            create_desktop_shortcut: false,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    default_scope: Option<String>,
    default_edition: Option<String>,
    create_desktop_shortcut: Option<bool>,
    download_timeout_secs: Option<u64>,
}

impl Settings {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading settings: {}", path.display()))?;
        parse_settings(&content)
            .with_context(|| format!("failed parsing settings: {}", path.display()))
    }

    pub(crate) fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

pub(crate) fn parse_settings(content: &str) -> Result<Settings> {
    let file = toml::from_str::<SettingsFile>(content)?;
    let defaults = Settings::default();

    let default_scope = match file.default_scope.as_deref() {
        Some(value) => {
            Scope::parse(value).ok_or_else(|| anyhow!("unknown default_scope '{value}'"))?
        }
        None => defaults.default_scope,
    };
    let default_edition = match file.default_edition.as_deref() {
        Some(value) => {
            Edition::parse(value).ok_or_else(|| anyhow!("unknown default_edition '{value}'"))?
        }
        None => defaults.default_edition,
    };
    let download_timeout_secs = match file.download_timeout_secs {
        Some(0) => return Err(anyhow!("download_timeout_secs must be greater than zero")),
        Some(secs) => secs,
        None => defaults.download_timeout_secs,
    };

    Ok(Settings {
        default_scope,
        default_edition,
        create_desktop_shortcut: file
            .create_desktop_shortcut
            .unwrap_or(defaults.create_desktop_shortcut),
        download_timeout_secs,
    })
}
