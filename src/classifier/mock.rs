// Deterministic stand-in for the scoring service

use super::{BatchEntry, Classifier};
use crate::error::Result;
use crate::session::ClassificationResult;
use async_trait::async_trait;
use std::time::Duration;

const TOXIC_SCORE: f64 = 0.95;
const CLEAN_SCORE: f64 = 0.05;

/// Scores texts containing any configured term as toxic, after a fixed delay
pub struct MockClassifier {
    latency: Duration,
    toxic_terms: Vec<String>,
}

impl MockClassifier {
    pub fn new(latency: Duration, toxic_terms: Vec<String>) -> Self {
        let toxic_terms = toxic_terms.into_iter().map(|t| t.to_lowercase()).collect();
        Self {
            latency,
            toxic_terms,
        }
    }

    fn score(&self, text: &str) -> f64 {
        let text = text.to_lowercase();
        if self.toxic_terms.iter().any(|term| text.contains(term.as_str())) {
            TOXIC_SCORE
        } else {
            CLEAN_SCORE
        }
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn analyze_batch(&self, items: &[BatchEntry]) -> Result<Vec<ClassificationResult>> {
        tracing::debug!("Mock classifier scoring {} items", items.len());
        tokio::time::sleep(self.latency).await;
        Ok(items
            .iter()
            .map(|item| ClassificationResult::score(item.id, self.score(&item.text)))
            .collect())
    }

    async fn analyze_single(&self, text: &str) -> Result<f64> {
        tokio::time::sleep(self.latency).await;
        Ok(self.score(text))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
