use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Timeout used when `maxwait` is missing or unusable.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Connection settings for one YOURLS installation.
///
/// Field names on disk and on the wire follow the extension's storage keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Server root, with or without a trailing slash.
    #[serde(rename = "api", default)]
    pub api_base_url: String,
    #[serde(rename = "signature", default)]
    pub signature_token: String,
    /// Seconds to wait for the server, stored as the user typed it.
    #[serde(
        rename = "maxwait",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_max_wait"
    )]
    pub timeout: Option<MaxWait>,
}

/// Raw `maxwait` value. The options page stores whatever was typed, so
/// numbers and text both occur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxWait {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Any `maxwait` that is neither a number nor text reads as unset.
fn lenient_max_wait<'de, D>(deserializer: D) -> Result<Option<MaxWait>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Known(MaxWait),
        Other(IgnoredAny),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Known(value) => Some(value),
        Raw::Other(_) => None,
    })
}

impl Settings {
    pub fn new(api_base_url: impl Into<String>, signature_token: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            signature_token: signature_token.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: MaxWait) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Effective timeout in whole seconds. Text is read up to the first
    /// non-digit; anything that does not yield a positive number falls back
    /// to [`DEFAULT_TIMEOUT_SECS`].
    pub fn timeout_secs(&self) -> u64 {
        let parsed = match &self.timeout {
            Some(MaxWait::Integer(n)) => Some(*n),
            Some(MaxWait::Float(f)) if f.is_finite() => Some(f.trunc() as i64),
            Some(MaxWait::Float(_)) => None,
            Some(MaxWait::Text(s)) => leading_integer(s),
            None => None,
        };
        parsed
            .filter(|n| *n > 0)
            .map_or(DEFAULT_TIMEOUT_SECS, |n| n as u64)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs())
    }
}

/// Integer prefix of `s` after leading whitespace and an optional sign.
fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let value: i64 = rest[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Persistent key-value store holding the current [`Settings`].
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current settings, or defaults when nothing has been saved yet.
    async fn load(&self) -> Result<Settings, SettingsError>;

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// Settings kept in a TOML file.
pub struct FileSettingsStore {
    path: PathBuf,
    defaults: Settings,
    write_lock: Mutex<()>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            defaults: Settings::default(),
            write_lock: Mutex::new(()),
        }
    }

    /// Settings returned by `load` while the file does not exist.
    pub fn with_defaults(mut self, defaults: Settings) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<Settings, SettingsError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no settings file, using defaults");
                return Ok(self.defaults.clone());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        toml::from_str(&content).map_err(|source| SettingsError::Decode {
            path: self.path.display().to_string(),
            source,
        })
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(settings)?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        atomic_write(&self.path, &content)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

/// Atomic write: write to temp file, then rename.
/// Temp filename includes PID to avoid cross-process collisions.
async fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    tokio::fs::write(&tmp_path, content.as_bytes()).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

/// In-process store, for embedding and tests.
#[derive(Default)]
pub struct MemorySettingsStore {
    current: RwLock<Settings>,
    saves: AtomicUsize,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(settings),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.current.read().await.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.current.write().await = settings.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
