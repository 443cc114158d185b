//! Configuration file for ~/.config/feedagg/config.toml.
//!
//! The file is optional: a missing or empty file yields `Config::default()`.
//! It also carries the session binding (`current_user_name`), which `login`
//! and `register` rewrite through [`Config::save`].
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchOptions, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_SIZE, DEFAULT_USER_AGENT};

const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "feedagg.db";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("HOME environment variable not set")]
    NoHome,
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `feedagg.db` next to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Account the CLI acts as. Set by `login` and `register`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// Upper bound on one feed fetch, request plus body.
    pub fetch_timeout_secs: u64,

    /// Largest feed document accepted.
    pub max_feed_size_bytes: u64,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            current_user_name: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            max_feed_size_bytes: DEFAULT_MAX_FEED_SIZE as u64,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "database_path",
        "current_user_name",
        "fetch_timeout_secs",
        "max_feed_size_bytes",
        "user_agent",
    ];

    /// `~/.config/feedagg`
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        Ok(PathBuf::from(home).join(".config").join("feedagg"))
    }

    /// `~/.config/feedagg/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::default_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from `path`.
    ///
    /// A missing or blank file gives the defaults. The document is parsed once;
    /// unrecognised top-level keys are logged and dropped, and a syntax or type
    /// error is reported as [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = read_capped(path, Self::MAX_FILE_SIZE)? else {
            tracing::debug!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        };
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let table: toml::Table = content.parse()?;
        table
            .keys()
            .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
            .for_each(|key| tracing::warn!(key = %key, "Unknown key in config file, ignoring"));

        let config: Config = toml::Value::Table(table).try_into()?;
        tracing::debug!(path = %path.display(), user = ?config.current_user_name, "Loaded configuration");
        Ok(config)
    }

    /// Write the configuration to `path` atomically (temp file, then rename).
    ///
    /// Creates the parent directory if needed. The destination is never left
    /// half-written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        use std::time::{SystemTime, UNIX_EPOCH};
        let random_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

        let written = (|| -> std::io::Result<()> {
            let mut temp_file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            temp_file.write_all(content.as_bytes())?;
            temp_file.sync_all()?;
            std::fs::rename(&temp_path, path)
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(ConfigError::Io(e));
        }

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Resolve the database file, relative to the config file's directory by default.
    pub fn database_path(&self, config_path: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) => path.clone(),
            None => config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(DATABASE_FILE_NAME),
        }
    }

    /// Fetch limits derived from the config. Zero values fall back to the defaults.
    pub fn fetch_options(&self) -> FetchOptions {
        let mut options = FetchOptions::default();
        if self.fetch_timeout_secs > 0 {
            options.timeout = Duration::from_secs(self.fetch_timeout_secs);
        } else {
            tracing::warn!("fetch_timeout_secs = 0, using default timeout");
        }
        if self.max_feed_size_bytes > 0 {
            options.max_size = usize::try_from(self.max_feed_size_bytes).unwrap_or(usize::MAX);
        } else {
            tracing::warn!("max_feed_size_bytes = 0, using default size limit");
        }
        options
    }

    pub fn set_current_user(&mut self, name: &str) {
        self.current_user_name = Some(name.to_string());
    }
}

// ============================================================================
// Tests
// ============================================================================

/// Read `path` as UTF-8, refusing anything longer than `limit` bytes.
///
/// `Ok(None)` means the file does not exist. The limit is enforced on the bytes
/// actually read, so a file that grows after being opened is still caught.
fn read_capped(path: &Path, limit: u64) -> Result<Option<String>, ConfigError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let mut content = String::new();
    file.take(limit + 1).read_to_string(&mut content)?;
    if content.len() as u64 > limit {
        return Err(ConfigError::TooLarge(format!(
            "{} is larger than {} bytes",
            path.display(),
            limit
        )));
    }
    Ok(Some(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("feedagg_config_test_{}", name));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, None);
        assert_eq!(config.current_user_name, None);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.max_feed_size_bytes, 10 * 1024 * 1024);
        assert!(config.user_agent.starts_with("feedagg/"));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedagg_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = test_dir("empty");
        let path = dir.join("config.toml");
        std::fs::write(&path, "   \n  ").unwrap();

        assert_eq!(Config::load(&path).unwrap(), Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = test_dir("partial");
        let path = dir.join("config.toml");
        std::fs::write(&path, "current_user_name = \"alice\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.current_user_name.as_deref(), Some("alice"));
        assert_eq!(config.fetch_timeout_secs, 30);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = test_dir("full");
        let path = dir.join("config.toml");
        let content = r#"
database_path = "/var/lib/feedagg/feeds.db"
current_user_name = "bob"
fetch_timeout_secs = 5
max_feed_size_bytes = 2048
user_agent = "custom/1.0"
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.database_path(&path),
            PathBuf::from("/var/lib/feedagg/feeds.db")
        );
        assert_eq!(config.current_user_name.as_deref(), Some("bob"));
        assert_eq!(config.user_agent, "custom/1.0");
        assert_eq!(
            config.fetch_options(),
            FetchOptions {
                timeout: Duration::from_secs(5),
                max_size: 2048,
            }
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = test_dir("invalid");
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = test_dir("unknown");
        let path = dir.join("config.toml");
        std::fs::write(&path, "current_user_name = \"x\"\ntheme = \"dark\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.current_user_name.as_deref(), Some("x"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = test_dir("wrongtype");
        let path = dir.join("config.toml");
        std::fs::write(&path, "fetch_timeout_secs = \"soon\"\n").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = test_dir("too_large");
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_file_at_size_limit_accepted() {
        let dir = test_dir("at_limit");
        let path = dir.join("config.toml");
        let header = "user_agent = \"padded/1.0\"\n# ";
        let padding = "x".repeat(Config::MAX_FILE_SIZE as usize - header.len() - 1);
        std::fs::write(&path, format!("{header}{padding}\n")).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), Config::MAX_FILE_SIZE);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.user_agent, "padded/1.0");
        assert_eq!(config.fetch_timeout_secs, Config::default().fetch_timeout_secs);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_path_is_directory_returns_io_error() {
        let dir = test_dir("is_dir");
        assert!(matches!(Config::load(&dir), Err(ConfigError::Io(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_then_load() {
        let dir = test_dir("save");
        let path = dir.join("nested").join("config.toml");

        let mut config = Config::default();
        config.set_current_user("carol");
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
        // Absent optional keys are omitted rather than written empty
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("database_path"));

        // No temp files left behind
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_overwrites_existing() {
        let dir = test_dir("overwrite");
        let path = dir.join("config.toml");

        let mut config = Config::default();
        config.set_current_user("alice");
        config.save(&path).unwrap();
        config.set_current_user("bob");
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.current_user_name.as_deref(), Some("bob"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_database_path_defaults_next_to_config() {
        let config = Config::default();
        assert_eq!(
            config.database_path(Path::new("/home/u/.config/feedagg/config.toml")),
            PathBuf::from("/home/u/.config/feedagg/feedagg.db")
        );
    }

    #[test]
    fn test_zero_limits_fall_back_to_defaults() {
        let config = Config {
            fetch_timeout_secs: 0,
            max_feed_size_bytes: 0,
            ..Config::default()
        };
        assert_eq!(config.fetch_options(), FetchOptions::default());
    }
}
