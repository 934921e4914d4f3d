//! codelibrarian-embeddings: blocking HTTP clients for the embedding
//! service and the optional LLM query rewriter.
//!
//! Both speak OpenAI-compatible APIs and work with Ollama, OpenAI, and any
//! compatible endpoint.

mod rewriter;

pub use rewriter::QueryRewriter;

use codelibrarian_core::{truncate_chars, EmbeddingsConfig, LibrarianError};

/// Request timeout for embedding calls.
const EMBED_TIMEOUT_SECS: u64 = 30;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct EmbeddingClient {
    api_url: String,
    model: String,
    dimensions: usize,
    max_chars: usize,
    client: reqwest::blocking::Client,
}

impl EmbeddingClient {
    /// Build a client from the `[embeddings]` config section.
    pub fn new(config: &EmbeddingsConfig) -> Result<Self, LibrarianError> {
        let mut api_url = config.api_url.trim_end_matches('/').to_string();
        if !api_url.ends_with("/embeddings") {
            api_url.push_str("/embeddings");
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()
            .map_err(|e| LibrarianError::Embedding(e.to_string()))?;
        Ok(Self {
            api_url,
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_chars: config.max_chars,
            client,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed one batch of texts. Each text is truncated to the configured
    /// character cap before submission. Returns vectors in input order.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LibrarianError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_chars(t, self.max_chars))
            .collect();

        let body = serde_json::json!({
            "model": self.model,
            "input": truncated,
        });

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .map_err(|e| LibrarianError::Embedding(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(LibrarianError::Embedding(format!(
                "service returned status {status}: {body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .map_err(|e| LibrarianError::Embedding(format!("response parse error: {e}")))?;

        let data = json
            .get("data")
            .and_then(|v| v.as_array())
            .ok_or_else(|| LibrarianError::Embedding("missing data array in response".into()))?;

        // Responses carry an index field; sort by it so vectors line up
        // with the submitted texts.
        let mut items: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for (position, item) in data.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(|v| v.as_u64())
                .map(|i| i as usize)
                .unwrap_or(position);
            let embedding = item
                .get("embedding")
                .and_then(|v| v.as_array())
                .ok_or_else(|| {
                    LibrarianError::Embedding("missing embedding in response item".into())
                })?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            items.push((index, embedding));
        }
        items.sort_by_key(|(index, _)| *index);
        Ok(items.into_iter().map(|(_, embedding)| embedding).collect())
    }

    /// Embed a single text (used for search queries).
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>, LibrarianError> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        if vectors.is_empty() {
            return Err(LibrarianError::Embedding("empty embedding response".into()));
        }
        Ok(vectors.remove(0))
    }

    /// Verify the service is reachable and returns the configured width.
    pub fn check_connection(&self) -> Result<String, LibrarianError> {
        let vector = self.embed_one("test").map_err(|_| {
            LibrarianError::Embedding(format!(
                "could not reach embedding API at {}",
                self.api_url
            ))
        })?;
        if vector.len() != self.dimensions {
            return Err(LibrarianError::Embedding(format!(
                "dimension mismatch: got {}, expected {}; update embeddings.dimensions \
                 or run index --reembed",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(format!(
            "OK (model={}, dimensions={})",
            self.model,
            vector.len()
        ))
    }
}
