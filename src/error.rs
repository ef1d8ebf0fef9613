use std::path::PathBuf;
use thiserror::Error;

/// Every failure toxwatch can surface
#[derive(Error, Debug)]
pub enum ToxwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// All validator findings at once
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// A single bad value, usually from an env override
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Unparseable element selector
    #[error("Invalid selector: {0}")]
    Selector(String),

    /// Classifier transport or decoding failure
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Classifier answered with a non-success status
    #[error("Classifier API error (status {status}): {message}")]
    ClassifierApi { status: u16, message: String },

    #[error("Status store error: {0}")]
    Store(String),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Serde JSON failure on IPC frames, status files or replays
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Daemon unreachable or a request it refused
    #[error("Daemon error: {0}")]
    Daemon(String),

    /// A task on the other side of a channel has gone away
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl From<reqwest::Error> for ToxwatchError {
    fn from(err: reqwest::Error) -> Self {
        ToxwatchError::Classifier(err.to_string())
    }
}

/// One failed config check, keyed by dotted path (`highlight.threshold`)
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ToxwatchError>;
