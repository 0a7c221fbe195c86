use std::env;
use std::path::PathBuf;

use crate::settings::{MaxWait, Settings};

/// Default location of the settings file, relative to the working directory.
const DEFAULT_SETTINGS_PATH: &str = ".yourls-relay/settings.toml";

pub struct Config {
    pub settings_path: PathBuf,
    /// Settings used until the extension saves its own.
    pub default_settings: Settings,
}

impl Config {
    pub fn from_env() -> Self {
        let settings_path = env::var("YOURLS_RELAY_SETTINGS")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH), PathBuf::from);

        let api = env::var("YOURLS_API").unwrap_or_default();
        let signature = env::var("YOURLS_SIGNATURE").unwrap_or_default();

        let mut default_settings = Settings::new(api, signature);
        if let Ok(maxwait) = env::var("YOURLS_MAXWAIT") {
            default_settings = default_settings.with_timeout(MaxWait::Text(maxwait));
        }

        if default_settings.api_base_url.is_empty() {
            tracing::warn!("YOURLS_API not set, shortening needs settings from the extension");
        }

        Config {
            settings_path,
            default_settings,
        }
    }
}
