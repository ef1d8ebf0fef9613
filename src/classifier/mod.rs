//! Toxicity classifier collaborators
//!
//! The watcher only depends on the [`Classifier`] trait. [`HttpClassifier`]
//! talks to the remote scoring service; [`MockClassifier`] stands in for it
//! during development and tests.

mod http;
mod mock;

pub use http::HttpClassifier;
pub use mock::MockClassifier;

use crate::config::Config;
use crate::error::{Result, ToxwatchError};
use crate::session::ClassificationResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One item of a batch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub id: u64,
    pub text: String,
}

/// Trait for classification backends
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Score a batch; results may come back in any order
    async fn analyze_batch(&self, items: &[BatchEntry]) -> Result<Vec<ClassificationResult>>;

    /// Score a single text
    async fn analyze_single(&self, text: &str) -> Result<f64>;

    fn name(&self) -> &str;
}

/// Build the classifier selected by `classifier.mode`
pub fn from_config(config: &Config) -> Result<Arc<dyn Classifier>> {
    match config.classifier.mode.as_str() {
        "mock" => Ok(Arc::new(MockClassifier::new(
            config.mock_latency()?,
            config.classifier.mock_toxic_terms.clone(),
        ))),
        "http" => Ok(Arc::new(HttpClassifier::new(
            &config.classifier.base_url,
            &config.classifier.batch_path,
            &config.classifier.single_path,
            config.classifier_timeout()?,
        )?)),
        other => Err(ToxwatchError::Config(format!(
            "Unknown classifier mode: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_modes() {
        let mut config = Config::default();
        assert_eq!(from_config(&config).unwrap().name(), "mock");

        config.classifier.mode = "http".to_string();
        assert_eq!(from_config(&config).unwrap().name(), "http");

        config.classifier.mode = "carrier-pigeon".to_string();
        assert!(from_config(&config).is_err());
    }
}
