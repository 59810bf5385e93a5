//! Application configuration.
//!
//! Resolution order: built-in defaults, then `markpad.config.json` in the
//! data directory, then `MARKPAD_*` environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "markpad.config.json";
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1000;

pub const ENV_DATA_DIR: &str = "MARKPAD_DATA_DIR";
pub const ENV_BACKEND: &str = "MARKPAD_BACKEND";
pub const ENV_SAVE_DEBOUNCE_MS: &str = "MARKPAD_SAVE_DEBOUNCE_MS";
pub const ENV_LOG: &str = "MARKPAD_LOG";

/// Where the document is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host file if its directory is usable, else local storage.
    #[default]
    Auto,
    Host,
    Local,
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "host" => Ok(BackendKind::Host),
            "local" => Ok(BackendKind::Local),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!(
                "Invalid backend '{}'. Must be one of: auto, host, local, memory",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub backend: BackendKind,
    pub save_debounce_ms: u64,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
}

/// On-disk form; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    backend: Option<BackendKind>,
    save_debounce_ms: Option<u64>,
    log_filter: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: BackendKind::Auto,
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            log_filter: "info".to_string(),
        }
    }
}

/// `data/` next to the executable, or under the working directory when
/// the executable path is unknown.
fn default_data_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("data")
}

impl AppConfig {
    /// Load from the process environment.
    pub fn load() -> Self {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = AppConfig::default();
        if let Some(dir) = env(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }

        config.apply_file(&config.data_dir.join(CONFIG_FILE_NAME));

        if let Some(value) = env(ENV_BACKEND) {
            match value.parse() {
                Ok(kind) => config.backend = kind,
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_BACKEND, e),
            }
        }
        if let Some(value) = env(ENV_SAVE_DEBOUNCE_MS) {
            match value.trim().parse() {
                Ok(ms) => config.save_debounce_ms = ms,
                Err(e) => tracing::warn!("Ignoring {}='{}': {}", ENV_SAVE_DEBOUNCE_MS, value, e),
            }
        }
        if let Some(filter) = env(ENV_LOG).filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }
        config
    }

    fn apply_file(&mut self, path: &Path) {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return,
        };
        match serde_json::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                if let Some(backend) = file.backend {
                    self.backend = backend;
                }
                if let Some(ms) = file.save_debounce_ms {
                    self.save_debounce_ms = ms;
                }
                if let Some(filter) = file.log_filter {
                    self.log_filter = filter;
                }
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed config file"),
        }
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}
