// HTTP client for the remote scoring service (JSON over POST)

use super::{BatchEntry, Classifier};
use crate::error::{Result, ToxwatchError};
use crate::session::{ClassificationResult, Verdict};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result item as returned by the service: a score, a flag, or both
#[derive(Debug, Deserialize)]
struct WireResult {
    id: u64,
    #[serde(default, alias = "score")]
    toxicity: Option<f64>,
    #[serde(default, rename = "isToxic")]
    is_toxic: Option<bool>,
}

#[derive(Debug, Serialize)]
struct SingleRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SingleResponse {
    #[serde(alias = "score")]
    toxicity: f64,
}

pub struct HttpClassifier {
    client: reqwest::Client,
    batch_url: String,
    single_url: String,
}

impl HttpClassifier {
    pub fn new(base_url: &str, batch_path: &str, single_path: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToxwatchError::Classifier(format!("Failed to build HTTP client: {}", e)))?;

        let base = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            batch_url: format!("{}{}", base, batch_path),
            single_url: format!("{}{}", base, single_path),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let resp = self.client.post(url).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ToxwatchError::ClassifierApi {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

/// Turn wire results into verdicts, skipping items that carry neither field
fn decode_batch(wire: Vec<WireResult>) -> Vec<ClassificationResult> {
    wire.into_iter()
        .filter_map(|item| {
            let verdict = match (item.toxicity, item.is_toxic) {
                (Some(score), _) => Verdict::Score(score),
                (None, Some(flag)) => Verdict::Flag(flag),
                (None, None) => {
                    tracing::warn!("Classifier result for id {} has no verdict", item.id);
                    return None;
                }
            };
            Some(ClassificationResult {
                id: item.id,
                verdict,
            })
        })
        .collect()
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn analyze_batch(&self, items: &[BatchEntry]) -> Result<Vec<ClassificationResult>> {
        tracing::debug!("POST {} ({} items)", self.batch_url, items.len());
        let resp = self.post(&self.batch_url, items).await?;
        let wire: Vec<WireResult> = resp.json().await?;
        Ok(decode_batch(wire))
    }

    async fn analyze_single(&self, text: &str) -> Result<f64> {
        let resp = self.post(&self.single_url, &SingleRequest { text }).await?;
        let single: SingleResponse = resp.json().await?;
        Ok(Verdict::Score(single.toxicity).score())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Received = Arc<Mutex<Vec<Value>>>;

    /// Serve `app` on an ephemeral port, returning its base URL
    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    async fn analyze_batch(State(received): State<Received>, Json(body): Json<Value>) -> Json<Value> {
        received.lock().unwrap().push(body);
        Json(json!([{"id": 7, "toxicity": 0.91}]))
    }

    async fn analyze_single(Json(body): Json<Value>) -> Json<Value> {
        let toxic = body["text"].as_str().unwrap_or_default().contains("idiot");
        Json(json!({ "score": if toxic { 0.97 } else { 0.02 } }))
    }

    async fn model_not_loaded() -> (StatusCode, Json<Value>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "Model or tokenizer not loaded."})),
        )
    }

    fn classifier(base: &str) -> HttpClassifier {
        HttpClassifier::new(base, "/analyze_batch", "/analyze_single", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_decode_mixed_results() {
        let wire: Vec<WireResult> = serde_json::from_str(
            r#"[{"id": 1, "toxicity": 0.8}, {"id": 2, "isToxic": true}, {"id": 3, "score": 0.1}, {"id": 4}]"#,
        )
        .unwrap();

        let results = decode_batch(wire);
        assert_eq!(
            results,
            vec![
                ClassificationResult::score(1, 0.8),
                ClassificationResult::flag(2, true),
                ClassificationResult::score(3, 0.1),
            ]
        );
    }

    #[tokio::test]
    async fn test_analyze_batch_roundtrip() {
        let received = Received::default();
        let app = Router::new()
            .route("/analyze_batch", post(analyze_batch))
            .with_state(received.clone());
        let classifier = classifier(&serve(app).await);

        let items = vec![BatchEntry { id: 7, text: "hello world".to_string() }];
        let results = classifier.analyze_batch(&items).await.unwrap();
        assert_eq!(results, vec![ClassificationResult::score(7, 0.91)]);

        let sent = received.lock().unwrap().clone();
        assert_eq!(sent, vec![json!([{"id": 7, "text": "hello world"}])]);
    }

    #[tokio::test]
    async fn test_analyze_single_reads_score_alias() {
        let app = Router::new().route("/analyze_single", post(analyze_single));
        let classifier = classifier(&serve(app).await);

        assert!(classifier.analyze_single("what an idiot").await.unwrap() > 0.9);
        assert!(classifier.analyze_single("good morning").await.unwrap() < 0.1);
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let app = Router::new().route("/analyze_single", post(model_not_loaded));
        let classifier = classifier(&serve(app).await);

        match classifier.analyze_single("anything").await {
            Err(ToxwatchError::ClassifierApi { status, message }) => {
                assert_eq!(status, 500);
                assert!(message.contains("not loaded"));
            }
            other => panic!("Expected API error, got {:?}", other),
        }
    }
}
