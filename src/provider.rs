//! HTTP embedding provider.
//!
//! Speaks the HuggingFace inference "feature-extraction" API: the request is
//! `{"inputs": [text]}` and a successful answer is a JSON array whose first
//! element is the embedding. While the hosted model loads, the API answers
//! `503` with `{"estimated_time": <seconds>}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::embedder::EmbeddingProvider;
use crate::error::ProviderError;

/// sentence-transformers/all-mpnet-base-v2 produces 768-dimensional embeddings.
pub const DEFAULT_PROVIDER_URL: &str = "https://api-inference.huggingface.co/pipeline/feature-extraction/sentence-transformers/all-mpnet-base-v2";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct WarmingUpBody {
    estimated_time: f64,
}

/// Embedding provider backed by an HTTP endpoint.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_token: None,
        })
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        debug!(url = %self.url, chars = text.chars().count(), "requesting embedding");

        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "inputs": [text] }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_send_error)?;
        let status = response.status();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            return Err(warming_up(&body).unwrap_or_else(|| ProviderError::Transient(format!("status {status}"))));
        }

        if matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(ProviderError::Transient(format!("status {status}")));
        }

        if !status.is_success() {
            return Err(ProviderError::UnexpectedResponse(format!(
                "request failed with status {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(format!("invalid JSON body: {e}")))?;

        parse_embedding(body)
    }
}

/// Reads the wait hint of a 503 body. Negative, NaN or out of range
/// estimates are treated as no hint at all.
fn warming_up(body: &str) -> Option<ProviderError> {
    let WarmingUpBody { estimated_time } = serde_json::from_str(body).ok()?;
    let estimated = Duration::try_from_secs_f64(estimated_time).ok()?;
    Some(ProviderError::WarmingUp { estimated })
}

fn classify_send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ProviderError::Transient(err.to_string())
    } else {
        ProviderError::UnexpectedResponse(err.to_string())
    }
}

/// Pulls the first embedding out of a feature-extraction response.
fn parse_embedding(body: Value) -> Result<Vec<f32>, ProviderError> {
    let first = match body {
        Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
        _ => {
            return Err(ProviderError::UnexpectedResponse(
                "expected a non-empty JSON array".to_string(),
            ));
        }
    };

    first
        .as_array()
        .ok_or_else(|| ProviderError::UnexpectedResponse("embedding row must be an array".to_string()))?
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| ProviderError::UnexpectedResponse("embedding value must be a number".to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_embedding() {
        let vector = parse_embedding(json!([[0.25, -1.0, 3]])).unwrap();
        assert_eq!(vector, vec![0.25, -1.0, 3.0]);
    }

    #[test]
    fn test_parse_embedding_takes_first_row() {
        let vector = parse_embedding(json!([[1.0], [2.0]])).unwrap();
        assert_eq!(vector, vec![1.0]);
    }

    #[test]
    fn test_warming_up_hint() {
        assert_eq!(
            warming_up(r#"{"estimated_time": 20.5}"#),
            Some(ProviderError::WarmingUp { estimated: Duration::from_millis(20500) })
        );
        assert_eq!(warming_up(r#"{"estimated_time": 1e300}"#), None);
        assert_eq!(warming_up(r#"{"estimated_time": -1}"#), None);
        assert_eq!(warming_up(r#"{"error": "overloaded"}"#), None);
        assert_eq!(warming_up("<html>"), None);
    }

    #[test]
    fn test_parse_embedding_rejects_bad_shapes() {
        for body in [
            json!([]),
            json!({"error": "oops"}),
            json!([1.0, 2.0]),
            json!([["a", "b"]]),
            json!("text"),
        ] {
            assert!(
                matches!(parse_embedding(body.clone()), Err(ProviderError::UnexpectedResponse(_))),
                "accepted {body}"
            );
        }
    }
}
