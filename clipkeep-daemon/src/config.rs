use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use clipkeep_core::{DEFAULT_POLL_INTERVAL_MS, MAX_UNPINNED_ENTRIES};
use serde::{Deserialize, Serialize};

/// `config.json` is expected to be tiny.
pub const MAX_CONFIG_BYTES: u64 = 64 * 1024;
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DATA_DIR_ENV: &str = "CLIPKEEP_DATA_DIR";

pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const MAX_ENTRIES_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SavedConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Cap on non-favorite history entries.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Executable that prints the clipboard bitmap as a PNG data URI.
    #[serde(default)]
    pub image_helper: Option<PathBuf>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_entries() -> usize {
    MAX_UNPINNED_ENTRIES
}

impl Default for SavedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_entries: default_max_entries(),
            image_helper: None,
        }
    }
}

impl SavedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug)]
pub enum ConfigLoadError {
    Metadata(io::Error),
    TooLarge { size: u64, max: u64 },
    Read(io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::Metadata(e) => write!(f, "metadata read failed: {e}"),
            ConfigLoadError::TooLarge { size, max } => {
                write!(f, "file too large: {size} bytes (max {max})")
            }
            ConfigLoadError::Read(e) => write!(f, "read failed: {e}"),
            ConfigLoadError::Parse(e) => write!(f, "parse failed: {e}"),
            ConfigLoadError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigLoadError::Metadata(e) => Some(e),
            ConfigLoadError::Read(e) => Some(e),
            ConfigLoadError::Parse(e) => Some(e),
            ConfigLoadError::TooLarge { .. } | ConfigLoadError::Invalid(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigSaveError {
    Invalid(String),
    Serialize(serde_json::Error),
    CreateDir(io::Error),
    WriteTmp(io::Error),
    Rename(io::Error),
}

impl std::fmt::Display for ConfigSaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSaveError::Invalid(msg) => write!(f, "invalid config: {msg}"),
            ConfigSaveError::Serialize(e) => write!(f, "serialize failed: {e}"),
            ConfigSaveError::CreateDir(e) => write!(f, "create dir failed: {e}"),
            ConfigSaveError::WriteTmp(e) => write!(f, "tmp write failed: {e}"),
            ConfigSaveError::Rename(e) => write!(f, "rename failed: {e}"),
        }
    }
}

impl std::error::Error for ConfigSaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigSaveError::Invalid(_) => None,
            ConfigSaveError::Serialize(e) => Some(e),
            ConfigSaveError::CreateDir(e) => Some(e),
            ConfigSaveError::WriteTmp(e) => Some(e),
            ConfigSaveError::Rename(e) => Some(e),
        }
    }
}

/// `CLIPKEEP_DATA_DIR`, else the platform data dir (`~/Library/Application Support/Clipkeep`).
pub fn default_data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(override_dir);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Clipkeep")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

pub fn validate_config(cfg: &SavedConfig) -> Result<(), String> {
    let mut errors: Vec<String> = Vec::new();

    if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&cfg.poll_interval_ms) {
        errors.push(format!(
            "pollIntervalMs must be between {MIN_POLL_INTERVAL_MS} and {MAX_POLL_INTERVAL_MS} (got {}).",
            cfg.poll_interval_ms
        ));
    }

    if cfg.max_entries == 0 || cfg.max_entries > MAX_ENTRIES_LIMIT {
        errors.push(format!(
            "maxEntries must be between 1 and {MAX_ENTRIES_LIMIT} (got {}).",
            cfg.max_entries
        ));
    }

    if let Some(helper) = &cfg.image_helper
        && helper.as_os_str().is_empty()
    {
        errors.push("imageHelper must not be empty when set.".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join(" "))
    }
}

pub fn parse_config_json(data: &str) -> Result<SavedConfig, serde_json::Error> {
    serde_json::from_str::<SavedConfig>(data)
}

pub fn load_config_from_path(path: &Path) -> Result<SavedConfig, ConfigLoadError> {
    let meta = fs::metadata(path).map_err(ConfigLoadError::Metadata)?;
    if meta.len() > MAX_CONFIG_BYTES {
        return Err(ConfigLoadError::TooLarge {
            size: meta.len(),
            max: MAX_CONFIG_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(ConfigLoadError::Read)?;
    let cfg = parse_config_json(&data).map_err(ConfigLoadError::Parse)?;
    validate_config(&cfg).map_err(ConfigLoadError::Invalid)?;
    Ok(cfg)
}

/// Loads `config.json` from `data_dir`; a missing file yields defaults.
pub fn load_config(data_dir: &Path) -> Result<SavedConfig, ConfigLoadError> {
    let path = config_path(data_dir);
    match load_config_from_path(&path) {
        Err(ConfigLoadError::Metadata(err)) if err.kind() == io::ErrorKind::NotFound => {
            Ok(SavedConfig::default())
        }
        other => other,
    }
}

pub fn save_config_to_path(path: &Path, cfg: &SavedConfig) -> Result<(), ConfigSaveError> {
    validate_config(cfg).map_err(ConfigSaveError::Invalid)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ConfigSaveError::CreateDir)?;
    }

    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(cfg).map_err(ConfigSaveError::Serialize)?;
    fs::write(&tmp, payload.as_bytes()).map_err(ConfigSaveError::WriteTmp)?;

    if path.exists() {
        let _ = fs::remove_file(path);
    }

    fs::rename(&tmp, path).map_err(ConfigSaveError::Rename)?;
    Ok(())
}

pub fn save_config_with_retry(data_dir: &Path, cfg: &SavedConfig) -> Result<(), ConfigSaveError> {
    const MAX_ATTEMPTS: u32 = 3;
    const BACKOFF_BASE_MS: u64 = 50;

    let path = config_path(data_dir);

    let mut attempt: u32 = 1;
    loop {
        match save_config_to_path(&path, cfg) {
            Ok(()) => return Ok(()),
            Err(err @ ConfigSaveError::Invalid(_)) => return Err(err),
            Err(err) if attempt >= MAX_ATTEMPTS => return Err(err),
            Err(_) => {
                let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                std::thread::sleep(Duration::from_millis(backoff_ms));
                attempt += 1;
            }
        }
    }
}
