//! Chroma-compatible REST client
//!
//! Speaks the v1 collection API of a Chroma server: collections are
//! addressed by server-assigned uuid, resolved once per name and cached
//! for the process lifetime. Every call carries the per-call timeout from
//! §5; timeouts and connection failures surface transient so the retry
//! wrapper can retry them.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{MemoryError, Result};

use super::{QueryHit, VectorRecord, VectorStore, Where};

/// Default per-call timeout
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// REST client for a Chroma-compatible vector store
pub struct ChromaClient {
    client: reqwest::Client,
    base_url: String,
    /// name -> server-side collection uuid
    collection_ids: RwLock<HashMap<String, String>>,
}

impl ChromaClient {
    /// Connect to `host:port`. No request is made until first use.
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| MemoryError::database(format!("http client init: {}", e)))?;
        Ok(Self {
            client,
            base_url: format!("http://{}:{}/api/v1", host, port),
            collection_ids: RwLock::new(HashMap::new()),
        })
    }

    /// Resolve a collection name to its server uuid, creating on first use
    async fn collection_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.collection_ids.read().await.get(name) {
            return Ok(id.clone());
        }

        let body = json!({ "name": name, "get_or_create": true });
        let response = self
            .client
            .post(format!("{}/collections", self.base_url))
            .json(&body)
            .send()
            .await?;
        let value = Self::check(response).await?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| MemoryError::database("collection response missing id"))?
            .to_string();

        debug!(collection = name, id = %id, "resolved collection");
        self.collection_ids
            .write()
            .await
            .insert(name.to_string(), id.clone());
        Ok(id)
    }

    /// Map a response to JSON, classifying HTTP failures
    async fn check(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| MemoryError::database(format!("malformed response: {}", e)));
        }
        let transient = status.as_u16() == 502 || status.as_u16() == 503;
        let body = response.text().await.unwrap_or_default();
        Err(MemoryError::database_with_transience(
            format!("store returned {}: {}", status, body),
            transient,
        ))
    }

    async fn post(&self, collection: &str, op: &str, body: Value) -> Result<Value> {
        let id = self.collection_id(collection).await?;
        let response = self
            .client
            .post(format!("{}/collections/{}/{}", self.base_url, id, op))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await
    }

    fn meta_or_empty(value: Option<&Value>) -> Map<String, Value> {
        value
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    fn string_at(value: Option<&Value>) -> String {
        value
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    fn embedding_at(value: Option<&Value>) -> Vec<f32> {
        value
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_f64)
                    .map(|v| v as f32)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for ChromaClient {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        self.collection_id(collection).await.map(|_| ())
    }

    async fn add(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let body = json!({
            "ids": records.iter().map(|r| &r.id).collect::<Vec<_>>(),
            "embeddings": records.iter().map(|r| &r.embedding).collect::<Vec<_>>(),
            "documents": records.iter().map(|r| &r.document).collect::<Vec<_>>(),
            "metadatas": records.iter().map(|r| &r.metadata).collect::<Vec<_>>(),
        });
        self.post(collection, "add", body).await.map(|_| ())
    }

    async fn get(
        &self,
        collection: &str,
        ids: Option<&[String]>,
        filter: Option<&Where>,
        limit: Option<usize>,
        include_embeddings: bool,
    ) -> Result<Vec<VectorRecord>> {
        let mut include = vec!["documents", "metadatas"];
        if include_embeddings {
            include.push("embeddings");
        }
        let mut body = json!({ "include": include });
        if let Some(ids) = ids {
            body["ids"] = json!(ids);
        }
        if let Some(filter) = filter {
            body["where"] = filter.to_json();
        }
        if let Some(limit) = limit {
            body["limit"] = json!(limit);
        }

        let value = self.post(collection, "get", body).await?;
        let ids = value
            .get("ids")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let empty = Vec::new();
        let documents = value
            .get("documents")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let metadatas = value
            .get("metadatas")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let embeddings = value
            .get("embeddings")
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        Ok(ids
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let id = id.as_str()?;
                Some(VectorRecord {
                    id: id.to_string(),
                    embedding: Self::embedding_at(embeddings.get(i)),
                    document: Self::string_at(documents.get(i)),
                    metadata: Self::meta_or_empty(metadatas.get(i)),
                })
            })
            .collect())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&Where>,
    ) -> Result<Vec<QueryHit>> {
        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = filter {
            body["where"] = filter.to_json();
        }

        let value = self.post(collection, "query", body).await?;
        // Responses are batched per query embedding; we always send one
        let first = |key: &str| -> Vec<Value> {
            value
                .get(key)
                .and_then(Value::as_array)
                .and_then(|batches| batches.first())
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        let ids = first("ids");
        let documents = first("documents");
        let metadatas = first("metadatas");
        let distances = first("distances");

        Ok(ids
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let id = id.as_str()?;
                Some(QueryHit {
                    id: id.to_string(),
                    document: Self::string_at(documents.get(i)),
                    metadata: Self::meta_or_empty(metadatas.get(i)),
                    distance: distances
                        .get(i)
                        .and_then(Value::as_f64)
                        .unwrap_or(1.0) as f32,
                })
            })
            .collect())
    }

    async fn update(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut body = json!({
            "ids": records.iter().map(|r| &r.id).collect::<Vec<_>>(),
            "documents": records.iter().map(|r| &r.document).collect::<Vec<_>>(),
            "metadatas": records.iter().map(|r| &r.metadata).collect::<Vec<_>>(),
        });
        // Only ship embeddings when every record carries one; empty means
        // "keep the stored vector"
        if records.iter().all(|r| !r.embedding.is_empty()) {
            body["embeddings"] = json!(records.iter().map(|r| &r.embedding).collect::<Vec<_>>());
        }
        self.post(collection, "update", body).await.map(|_| ())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post(collection, "delete", json!({ "ids": ids }))
            .await
            .map(|_| ())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let id = self.collection_id(collection).await?;
        let response = self
            .client
            .get(format!("{}/collections/{}/count", self.base_url, id))
            .send()
            .await?;
        let value = Self::check(response).await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| MemoryError::database("count response was not a number"))
    }
}

// ============================================================================
// TESTS
// ============================================================================
