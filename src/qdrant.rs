//! Qdrant-backed [`VectorIndex`] and [`DocumentSource`].
//!
//! The collection holds one point per document sentence. Its payload
//! carries the document id, the sentence text, the sentence's position in
//! the document and optionally the document title, under configurable
//! field names ([`VectorConfig`]).
//!
//! Talks to Qdrant's REST API:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | batched similarity search | `POST /collections/{c}/points/search/batch` |
//! | sentences of one document | `POST /collections/{c}/points/scroll` |

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use summary_harness_core::models::{DocumentScope, DocumentSentences, SentenceHit};
use summary_harness_core::store::{DocumentSource, VectorIndex};
use tracing::{debug, instrument};

use crate::config::VectorConfig;

const SCROLL_PAGE: usize = 256;

pub struct QdrantIndex {
    config: VectorConfig,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantIndex {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var)
                    .with_context(|| format!("{} environment variable not set", var))?,
            ),
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: format!(
                "{}/collections/{}/points",
                config.url.trim_end_matches('/'),
                config.collection
            ),
            config: config.clone(),
            api_key,
            client,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Qdrant request to {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Qdrant error {} from {}: {}", status, url, text);
        }
        Ok(response.json().await?)
    }

    fn scope_filter(&self, scope: &DocumentScope) -> Option<Value> {
        match scope {
            DocumentScope::All => None,
            DocumentScope::Only(ids) => Some(json!({
                "must": [{"key": self.config.document_field, "match": {"any": ids}}]
            })),
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    #[instrument(skip(self, vectors, scope), fields(collection = %self.config.collection, queries = vectors.len()))]
    async fn search(
        &self,
        vectors: &[Vec<f32>],
        limit: usize,
        scope: &DocumentScope,
        min_score: f32,
    ) -> Result<Vec<Vec<SentenceHit>>> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        if matches!(scope, DocumentScope::Only(ids) if ids.is_empty()) {
            return Ok(vec![Vec::new(); vectors.len()]);
        }

        let filter = self.scope_filter(scope);
        let searches: Vec<Value> = vectors
            .iter()
            .map(|vector| {
                let mut search = json!({
                    "vector": vector,
                    "limit": limit,
                    "with_payload": true,
                    "score_threshold": min_score,
                });
                if let Some(filter) = &filter {
                    search["filter"] = filter.clone();
                }
                search
            })
            .collect();

        let response = self
            .post("search/batch", &json!({ "searches": searches }))
            .await?;
        let rankings = parse_search_batch(&response, &self.config)?;
        debug!(
            hits = rankings.iter().map(Vec::len).sum::<usize>(),
            "sentence search complete"
        );
        Ok(rankings)
    }
}

#[async_trait]
impl DocumentSource for QdrantIndex {
    #[instrument(skip(self), fields(collection = %self.config.collection))]
    async fn document(&self, id: &str) -> Result<Option<DocumentSentences>> {
        let mut points: Vec<Value> = Vec::new();
        let mut offset = Value::Null;

        loop {
            let mut body = json!({
                "filter": {"must": [{"key": self.config.document_field, "match": {"value": id}}]},
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": false,
            });
            if !offset.is_null() {
                body["offset"] = offset.clone();
            }
            let response = self.post("scroll", &body).await?;
            let result = response
                .get("result")
                .ok_or_else(|| anyhow!("Invalid Qdrant scroll response: missing result"))?;
            if let Some(page) = result.get("points").and_then(|p| p.as_array()) {
                points.extend(page.iter().cloned());
            }
            offset = result.get("next_page_offset").cloned().unwrap_or(Value::Null);
            if offset.is_null() {
                break;
            }
        }

        Ok(assemble_document(id, &points, &self.config))
    }
}

fn payload_str<'a>(point: &'a Value, field: &str) -> Option<&'a str> {
    point.get("payload")?.get(field)?.as_str()
}

fn payload_index(point: &Value, field: &str) -> Option<usize> {
    point
        .get("payload")?
        .get(field)?
        .as_u64()
        .map(|i| i as usize)
}

/// Map a `search/batch` response to per-query sentence hits.
///
/// Points missing a document id, sentence or index are skipped.
pub fn parse_search_batch(response: &Value, config: &VectorConfig) -> Result<Vec<Vec<SentenceHit>>> {
    let batches = response
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow!("Invalid Qdrant search response: missing result"))?;

    Ok(batches
        .iter()
        .map(|batch| {
            batch
                .as_array()
                .map(|points| {
                    points
                        .iter()
                        .filter_map(|point| {
                            Some(SentenceHit {
                                document_id: payload_str(point, &config.document_field)?
                                    .to_string(),
                                sentence_index: payload_index(point, &config.index_field)?,
                                sentence: payload_str(point, &config.sentence_field)?.to_string(),
                                score: point.get("score")?.as_f64()? as f32,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect())
}

/// Order scrolled points by sentence index into a document.
pub fn assemble_document(
    id: &str,
    points: &[Value],
    config: &VectorConfig,
) -> Option<DocumentSentences> {
    let mut sentences: Vec<(usize, String)> = points
        .iter()
        .filter_map(|point| {
            Some((
                payload_index(point, &config.index_field)?,
                payload_str(point, &config.sentence_field)?.to_string(),
            ))
        })
        .collect();
    if sentences.is_empty() {
        return None;
    }
    sentences.sort_by_key(|(index, _)| *index);

    let title = points
        .iter()
        .find_map(|point| payload_str(point, &config.title_field))
        .map(str::to_string);

    Some(DocumentSentences {
        id: id.to_string(),
        title,
        sentences: sentences.into_iter().map(|(_, s)| s).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VectorConfig {
        VectorConfig {
            url: "http://localhost:6333/".into(),
            collection: "sentences".into(),
            document_field: "document_id".into(),
            sentence_field: "sentence".into(),
            index_field: "sentence_index".into(),
            title_field: "title".into(),
            api_key_env: None,
            timeout_secs: 5,
        }
    }

    fn point(doc: &str, index: u64, sentence: &str, score: f64) -> Value {
        json!({
            "id": format!("{}-{}", doc, index),
            "score": score,
            "payload": {"document_id": doc, "sentence_index": index, "sentence": sentence, "title": "Report"}
        })
    }

    #[test]
    fn test_parse_search_batch() {
        let response = json!({
            "result": [
                [point("a", 2, "Rates rose.", 0.91), {"id": 9, "score": 0.9, "payload": {}}],
                []
            ],
            "status": "ok"
        });
        let rankings = parse_search_batch(&response, &config()).unwrap();
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].len(), 1);
        assert_eq!(rankings[0][0].sentence_index, 2);
        assert!((rankings[0][0].score - 0.91).abs() < 1e-6);
        assert!(rankings[1].is_empty());
    }

    #[test]
    fn test_parse_search_rejects_missing_result() {
        assert!(parse_search_batch(&json!({"status": "error"}), &config()).is_err());
    }

    #[test]
    fn test_assemble_document_orders_sentences() {
        let points = vec![
            point("a", 1, "Second.", 0.0),
            point("a", 0, "First.", 0.0),
        ];
        let doc = assemble_document("a", &points, &config()).unwrap();
        assert_eq!(doc.sentences, vec!["First.", "Second."]);
        assert_eq!(doc.title.as_deref(), Some("Report"));
        assert!(assemble_document("a", &[], &config()).is_none());
    }

    #[test]
    fn test_base_url_and_scope_filter() {
        let index = QdrantIndex::new(&config()).unwrap();
        assert_eq!(
            index.base_url,
            "http://localhost:6333/collections/sentences/points"
        );
        assert!(index.scope_filter(&DocumentScope::All).is_none());
        let filter = index
            .scope_filter(&DocumentScope::Only(vec!["a".into()]))
            .unwrap();
        assert_eq!(filter["must"][0]["match"]["any"][0], "a");
    }

    #[tokio::test]
    async fn test_empty_scope_skips_request() {
        let index = QdrantIndex::new(&config()).unwrap();
        let rankings = index
            .search(&[vec![1.0]], 5, &DocumentScope::Only(vec![]), 0.5)
            .await
            .unwrap();
        assert_eq!(rankings, vec![Vec::<SentenceHit>::new()]);
    }
}
