use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chatline_sync::Delays;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::{ResultExt, Snafu};
use tempfile::NamedTempFile;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_API_PREFIX: &str = "/api/";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONVERSATION_PAGE_LIMIT: u32 = 50;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const SETTINGS_DIRECTORY_NAME: &str = "chatline";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "CHATLINE_";

const MIN_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_conversation_page_limit")]
    pub conversation_page_limit: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub delays: Delays,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
            conversation_page_limit: default_conversation_page_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            delays: Delays::default(),
        }
    }
}

impl ClientSettings {
    pub fn normalized(mut self) -> Self {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if self.base_url.is_empty() {
            self.base_url = default_base_url();
        }

        // Always exactly one slash on each side so paths join cleanly.
        let prefix = self.api_prefix.trim().trim_matches('/');
        self.api_prefix = if prefix.is_empty() {
            "/".to_string()
        } else {
            format!("/{prefix}/")
        };

        if self.request_timeout_ms == 0 {
            self.request_timeout_ms = default_request_timeout_ms();
        }
        if self.conversation_page_limit == 0 {
            self.conversation_page_limit = default_conversation_page_limit();
        }
        self.poll_interval_ms = self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        self.delays = self.delays.normalized();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Base URL every request path is appended to.
    pub fn api_root(&self) -> String {
        format!("{}{}", self.base_url, self.api_prefix)
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".chatline"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ClientSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> ClientSettings {
        let mut figment = Figment::from(Serialized::defaults(ClientSettings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }
        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ClientSettings::default()
            }
        }
    }

    /// Writes only the fields that differ from the defaults.
    fn persist(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        let directory = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory).context(CreateDirSnafu {
            stage: "create-settings-directory",
            path: directory.clone(),
        })?;

        let overrides = overridden_fields(settings).context(SerializeConfigSnafu {
            stage: "diff-settings-against-defaults",
        })?;
        let content = serde_json::to_string_pretty(&overrides).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let mut staged = NamedTempFile::new_in(&directory).context(StageFileSnafu {
            stage: "create-staged-settings-file",
            path: directory.clone(),
        })?;
        staged
            .write_all(content.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .context(StageFileSnafu {
                stage: "write-staged-settings-file",
                path: staged.path().to_path_buf(),
            })?;
        staged.persist(&self.config_path).context(ReplaceFileSnafu {
            stage: "replace-settings-file",
            path: self.config_path.clone(),
        })?;

        tracing::info!(
            path = ?self.config_path,
            fields = overrides.len(),
            "saved settings overrides"
        );
        Ok(())
    }
}

/// Top-level settings fields whose value differs from [`ClientSettings::default`].
fn overridden_fields(
    settings: &ClientSettings,
) -> Result<Map<String, Value>, serde_json::Error> {
    let defaults = serde_json::to_value(ClientSettings::default())?;
    let Value::Object(mut fields) = serde_json::to_value(settings)? else {
        return Ok(Map::new());
    };
    fields.retain(|name, value| defaults.get(name) != Some(&*value));
    Ok(fields)
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to stage settings at {path:?} on `{stage}`: {source}"))]
    StageFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace settings file at {path:?} on `{stage}`: {source}"))]
    ReplaceFile {
        stage: &'static str,
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_prefix() -> String {
    DEFAULT_API_PREFIX.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_conversation_page_limit() -> u32 {
    DEFAULT_CONVERSATION_PAGE_LIMIT
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(error) => panic!("tempdir: {error}"),
        };
        let store = SettingsStore::new(dir.path().join("absent.json"));

        let settings = store.settings();
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.api_root(), "http://127.0.0.1:8000/api/");
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.delays, Delays::default());
    }

    #[test]
    fn file_values_are_layered_over_defaults_and_normalized() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(error) => panic!("tempdir: {error}"),
        };
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let written = std::fs::write(
            &path,
            r#"{
                "base_url": "https://chat.example.com/",
                "api_prefix": "v2",
                "delays": {"failure_grace_ms": 10, "playback_min_ms": 60}
            }"#,
        );
        assert!(written.is_ok());

        let settings = SettingsStore::new(path).settings();

        assert_eq!(settings.api_root(), "https://chat.example.com/v2/");
        assert_eq!(settings.conversation_page_limit, 50);
        assert_eq!(settings.delays.failure_grace_ms, 40);
        assert_eq!(settings.delays.playback_max_ms, 60);
        assert_eq!(settings.delays.thinking_indicator_ms, 2_000);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(error) => panic!("tempdir: {error}"),
        };
        let path = dir.path().join(SETTINGS_FILE_NAME);
        assert!(std::fs::write(&path, "{ not json").is_ok());

        let settings = SettingsStore::new(path).settings();

        assert_eq!(*settings, ClientSettings::default());
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(error) => panic!("tempdir: {error}"),
        };
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        let updated = ClientSettings {
            poll_interval_ms: 10,
            ..ClientSettings::default()
        };
        assert!(store.update(updated).is_ok());
        assert_eq!(store.settings().poll_interval_ms, 250);

        let reloaded = SettingsStore::new(path);
        assert_eq!(reloaded.settings().poll_interval_ms, 250);
        assert_eq!(*reloaded.settings(), *store.settings());
    }

    #[test]
    fn only_overridden_fields_are_written() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(error) => panic!("tempdir: {error}"),
        };
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        let updated = ClientSettings {
            base_url: "https://chat.example.com".to_string(),
            ..ClientSettings::default()
        };
        assert!(store.update(updated).is_ok());

        let written = match std::fs::read_to_string(&path) {
            Ok(written) => written,
            Err(error) => panic!("read settings: {error}"),
        };
        let fields = match serde_json::from_str::<Value>(&written) {
            Ok(Value::Object(fields)) => fields,
            other => panic!("settings file should hold an object, got {other:?}"),
        };
        assert_eq!(
            fields.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["base_url"]
        );
        assert_eq!(
            SettingsStore::new(path).settings().api_root(),
            "https://chat.example.com/api/"
        );
    }
}
