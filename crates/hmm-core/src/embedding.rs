//! Embedding client contract (A3): turns text into fixed-dimension vectors
//! for the archival store's nearest-neighbor search.

use async_trait::async_trait;

use crate::error::{HmmError, HmmResult};

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Dimension of every vector this client produces. Fixed for the
    /// lifetime of the client; the archival store captures it once at
    /// construction and rejects inserts whose embedding disagrees.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> HmmResult<Vec<f32>>;
}

/// OpenAI-compatible `/embeddings` endpoint client.
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key,
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> HmmResult<Vec<f32>> {
        let mut request = self
            .http
            .post(format!("{}/embeddings", self.api_url))
            .json(&serde_json::json!({
                "model": self.model,
                "input": text,
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HmmError::ModelError(format!(
                "embedding request failed ({status}): {body}"
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        let embedding = payload["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| HmmError::ModelError("embedding response missing data[0].embedding".to_string()))?;

        Ok(embedding
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_reports_configured_dimension() {
        let client = HttpEmbeddingClient::new("http://localhost", None, "text-embedding-3-small", 1536);
        assert_eq!(client.dimension(), 1536);
    }
}
