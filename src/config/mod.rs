//! Configuration management for toxwatch
//!
//! Every tunable of the watcher lives here: which elements count as the
//! timeline container and as posts, the batching thresholds, highlight
//! colors, and where the classifier lives.

use crate::error::{Result, ToxwatchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub page: PageConfig,
    pub normalize: NormalizeConfig,
    pub batching: BatchingConfig,
    pub highlight: HighlightConfig,
    pub classifier: ClassifierConfig,
    pub coordinator: CoordinatorConfig,
    pub daemon: DaemonConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Which elements of the page the watcher looks at
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// Element whose subtree is observed for new posts
    pub container_selector: String,
    /// Element holding the text of a single post
    pub post_selector: String,
    /// Clicking inside an element matching this opens a detail view
    pub detail_selector: String,
    pub wait_interval: String,
    pub wait_max_attempts: u32,
}

/// Replacement tokens used by the text normalizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    pub mention_token: String,
    pub url_token: String,
}

/// Dual-trigger flush thresholds for the batch buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    pub min_batch_size: usize,
    pub min_flush_interval: String,
    pub poll_interval: String,
}

/// Highlight configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightConfig {
    /// Scores strictly above this are toxic
    pub threshold: f64,
    pub interval: String,
    pub low_color: String,
    pub high_color: String,
}

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub mode: String, // "mock" or "http"
    pub base_url: String,
    pub batch_path: String,
    pub single_path: String,
    pub timeout: String,
    pub mock_latency: String,
    #[serde(default)]
    pub mock_toxic_terms: Vec<String>,
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub progress_interval: String,
}

/// Daemon configuration for IPC and persisted flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub status_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToxwatchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ToxwatchError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ToxwatchError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TOXWATCH_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("TOXWATCH_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "CLASSIFIER__MODE" => {
                self.classifier.mode = value.to_string();
            }
            "CLASSIFIER__BASE_URL" => {
                self.classifier.base_url = value.to_string();
            }
            "HIGHLIGHT__THRESHOLD" => {
                self.highlight.threshold =
                    value.parse().map_err(|_| ToxwatchError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as a number", value),
                    })?;
            }
            "BATCHING__MIN_BATCH_SIZE" => {
                self.batching.min_batch_size =
                    value.parse().map_err(|_| ToxwatchError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as an integer", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ToxwatchError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("toxwatch").join("config.toml"))
    }

    pub fn wait_interval(&self) -> Result<Duration> {
        parse_duration(&self.page.wait_interval)
    }

    pub fn min_flush_interval(&self) -> Result<Duration> {
        parse_duration(&self.batching.min_flush_interval)
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        parse_duration(&self.batching.poll_interval)
    }

    pub fn highlight_interval(&self) -> Result<Duration> {
        parse_duration(&self.highlight.interval)
    }

    pub fn progress_interval(&self) -> Result<Duration> {
        parse_duration(&self.coordinator.progress_interval)
    }

    pub fn classifier_timeout(&self) -> Result<Duration> {
        parse_duration(&self.classifier.timeout)
    }

    pub fn mock_latency(&self) -> Result<Duration> {
        parse_duration(&self.classifier.mock_latency)
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.toxwatch");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            page: PageConfig {
                container_selector: "main[role='main']".to_string(),
                post_selector: "div[data-testid='tweetText']".to_string(),
                detail_selector: "article".to_string(),
                wait_interval: "100ms".to_string(),
                wait_max_attempts: 100,
            },
            normalize: NormalizeConfig {
                mention_token: "@user".to_string(),
                url_token: "httpurl".to_string(),
            },
            batching: BatchingConfig {
                min_batch_size: 5,
                min_flush_interval: "5s".to_string(),
                poll_interval: "1s".to_string(),
            },
            highlight: HighlightConfig {
                threshold: 0.5,
                interval: "2s".to_string(),
                low_color: "#fff3b0".to_string(),
                high_color: "#e63946".to_string(),
            },
            classifier: ClassifierConfig {
                mode: "mock".to_string(),
                base_url: "http://127.0.0.1:8000".to_string(),
                batch_path: "/analyze_batch".to_string(),
                single_path: "/analyze_single".to_string(),
                timeout: "10s".to_string(),
                mock_latency: "1s".to_string(),
                mock_toxic_terms: vec!["idiot".to_string(), "stupid".to_string()],
            },
            coordinator: CoordinatorConfig {
                progress_interval: "1s".to_string(),
            },
            daemon: DaemonConfig {
                socket_path: data_dir.join("daemon.sock"),
                status_file: data_dir.join("status.json"),
                replay_file: None,
            },
        }
    }
}

/// Parse a duration string: "250ms", "5s", "2m", or a bare number of seconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || ToxwatchError::InvalidConfigValue {
        path: "duration".to_string(),
        message: format!("Invalid duration format: '{}'", s),
    };

    // Check "ms" before "s" because "ms" ends with "s"
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.trim().parse().map_err(|_| invalid())?;
        mins.checked_mul(60).map(Duration::from_secs).ok_or_else(invalid)
    } else {
        s.parse().map(Duration::from_secs).map_err(|_| invalid())
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
