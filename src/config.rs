//! Configuration types for the faire watch service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the watch service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaireConfig {
    /// Task and history storage settings.
    pub store: StoreConfig,
    /// Scheduler loop settings.
    pub scheduler: SchedulerConfig,
    /// Execution pool settings.
    pub executor: ExecutorConfig,
    /// Trend analysis settings.
    pub analysis: AnalysisConfig,
    /// HTTP gateway settings.
    pub gateway: GatewayConfig,
    /// Research engine endpoint settings.
    pub engine: EngineConfig,
}

/// Storage configuration (SQLite lives under `root_dir`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for persistent data (database file).
    pub root_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: default_data_root_dir(),
        }
    }
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between due-task scans.
    ///
    /// The scan is cheap (one indexed query), so the default of 30s keeps
    /// firing latency well under a minute without polling aggressively.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
        }
    }
}

/// Execution pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum standard research runs in flight at once.
    ///
    /// Standard runs can occupy an engine for up to ten minutes each, so
    /// this bounds engine load. Scheduled firings beyond the cap wait for
    /// a permit; they are not dropped.
    pub max_concurrent: usize,
    /// Maximum quick runs in flight at once.
    ///
    /// Quick runs are interactive: when both permits are taken the request
    /// is rejected immediately rather than queued.
    pub quick_max_concurrent: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            quick_max_concurrent: 2,
        }
    }
}

/// Trend analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// How many recent successful runs form the historical baseline.
    ///
    /// Smaller windows react faster to shifts; larger windows smooth out
    /// one-off spikes. 5 balances the two for daily-to-weekly intervals.
    pub trend_window: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { trend_window: 5 }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listen address for the HTTP API, e.g. `127.0.0.1:8710`.
    pub bind: String,
    /// Broadcast buffer size for the live event stream.
    ///
    /// Slow subscribers that fall more than this many events behind skip
    /// ahead to the newest event.
    pub events_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8710".to_owned(),
            events_buffer: 256,
        }
    }
}

/// Research engine endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the research engine API.
    pub base_url: String,
    /// API key for the engine (empty for unauthenticated local engines).
    pub api_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8750".to_owned(),
            api_key: String::new(),
        }
    }
}

/// Returns the default data root directory.
///
/// Resolves to `dirs::data_dir()/faire/` by default. Override with the
/// `FAIRE_DATA_DIR` environment variable.
fn default_data_root_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FAIRE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("faire"))
        .unwrap_or_else(|| PathBuf::from("/tmp/faire-data"))
}

impl FaireConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::FaireError::Configuration(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::FaireError::Configuration(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/faire/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("faire").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("faire")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/faire-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FaireConfig::default();
        assert_eq!(config.scheduler.tick_interval_secs, 30);
        assert_eq!(config.executor.max_concurrent, 3);
        assert_eq!(config.executor.quick_max_concurrent, 2);
        assert_eq!(config.analysis.trend_window, 5);
        assert!(config.gateway.events_buffer > 0);
        assert!(!config.gateway.bind.is_empty());
        assert!(!config.engine.base_url.is_empty());
        assert!(config.store.root_dir.to_string_lossy().contains("faire"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = std::env::temp_dir().join("faire-test-config-roundtrip");
        let path = dir.join("config.toml");

        let mut config = FaireConfig::default();
        config.scheduler.tick_interval_secs = 5;
        config.executor.max_concurrent = 8;
        config.gateway.bind = "0.0.0.0:9000".to_string();

        assert!(config.save_to_file(&path).is_ok());
        assert!(path.exists());

        let loaded = FaireConfig::from_file(&path);
        assert!(loaded.is_ok());
        let loaded = match loaded {
            Ok(c) => c,
            Err(_) => unreachable!("load should succeed"),
        };
        assert_eq!(loaded.scheduler.tick_interval_secs, 5);
        assert_eq!(loaded.executor.max_concurrent, 8);
        assert_eq!(loaded.gateway.bind, "0.0.0.0:9000");

        // Cleanup
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = FaireConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("faire-test-config-invalid");
        let path = dir.join("bad.toml");
        let _ = std::fs::create_dir_all(&dir);
        std::fs::write(&path, "this is not valid toml {{{").ok();

        let result = FaireConfig::from_file(&path);
        assert!(result.is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = FaireConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("faire"));
    }

    #[test]
    fn partial_toml_uses_section_defaults() {
        let toml_str = r#"
[executor]
max_concurrent = 1
"#;
        let config: FaireConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.executor.max_concurrent, 1);
        assert_eq!(config.executor.quick_max_concurrent, 2);
        assert_eq!(config.scheduler.tick_interval_secs, 30);
    }

    #[test]
    fn config_serializes_to_toml() {
        let config = FaireConfig::default();
        let result = toml::to_string_pretty(&config);
        assert!(result.is_ok());
        let toml_str = match result {
            Ok(s) => s,
            Err(_) => unreachable!("serialization should succeed"),
        };
        assert!(toml_str.contains("tick_interval_secs"));
        assert!(toml_str.contains("base_url"));
    }
}
