//! HTTP sentence encoder.
//!
//! Calls an OpenAI-compatible `POST {endpoint}/embeddings` endpoint. Input
//! larger than the configured `batch_size` is split into several calls,
//! and vectors are returned in input order.
//!
//! # Retry strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry with backoff
//! - HTTP 4xx (other) → fail immediately
//! - Network errors → retry
//!
//! Backoff doubles from one second, capped at 32 seconds.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use summary_harness_core::embedding::Encoder;
use tracing::{debug, warn};

use crate::config::EncoderConfig;

pub struct HttpEncoder {
    name: String,
    endpoint: String,
    model: String,
    api_key_env: Option<String>,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpEncoder {
    pub fn new(name: &str, config: &EncoderConfig) -> Result<Self> {
        if config.batch_size == 0 {
            bail!("encoders.{}.batch_size must be > 0", name);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            name: name.to_string(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = match &self.api_key_env {
            Some(var) => Some(
                std::env::var(var)
                    .map_err(|_| anyhow!("{} environment variable not set", var))?,
            ),
            None => None,
        };
        let url = format!("{}/embeddings", self.endpoint);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&body);
            if let Some(key) = &api_key {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let vectors = parse_embeddings(&json)?;
                        if vectors.len() != texts.len() {
                            bail!(
                                "encoder '{}' returned {} vectors for {} inputs",
                                self.name,
                                vectors.len(),
                                texts.len()
                            );
                        }
                        return Ok(vectors);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(encoder = %self.name, status = %status, attempt, "retrying embedding request");
                        last_err = Some(anyhow!("encoder '{}' error {}: {}", self.name, status, body_text));
                        continue;
                    }
                    bail!("encoder '{}' error {}: {}", self.name, status, body_text);
                }
                Err(e) => {
                    warn!(encoder = %self.name, error = %e, attempt, "retrying embedding request");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("embedding failed after retries")))
    }
}

#[async_trait]
impl Encoder for HttpEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn encode(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(sentences.len());
        for batch in sentences.chunks(self.batch_size) {
            debug!(encoder = %self.name, batch = batch.len(), "encoding sentences");
            vectors.extend(self.encode_batch(batch).await?);
        }
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
pub fn parse_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid embeddings response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        let vector: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_orders_by_index() {
        let body = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_embeddings(&body).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_without_index_keeps_position() {
        let body = json!({"data": [{"embedding": [0.5]}, {"embedding": [0.25]}]});
        assert_eq!(parse_embeddings(&body).unwrap(), vec![vec![0.5], vec![0.25]]);
    }

    #[test]
    fn test_parse_rejects_missing_data() {
        assert!(parse_embeddings(&json!({"error": "nope"})).is_err());
        assert!(parse_embeddings(&json!({"data": [{"vector": []}]})).is_err());
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = EncoderConfig {
            endpoint: "http://localhost".into(),
            model: "minilm".into(),
            api_key_env: None,
            batch_size: 0,
            max_retries: 0,
            timeout_secs: 1,
        };
        assert!(HttpEncoder::new("minilm", &config).is_err());
    }
}
