//! In-memory vector store
//!
//! An exact in-process double of the store interface: brute-force cosine
//! k-NN, full predicate evaluation, per-collection id maps. Used by the
//! test suites and by offline dream runs that operate on a dumped
//! snapshot.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::embeddings::cosine_distance;
use crate::error::{MemoryError, Result};

use super::{QueryHit, VectorRecord, VectorStore, Where};

/// Brute-force in-process implementation of [`VectorStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    async fn add(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection.to_string()).or_default();
        for record in records {
            entries.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        ids: Option<&[String]>,
        filter: Option<&Where>,
        limit: Option<usize>,
        include_embeddings: bool,
    ) -> Result<Vec<VectorRecord>> {
        let collections = self.collections.read().await;
        let Some(entries) = collections.get(collection) else {
            return Ok(vec![]);
        };

        let mut out: Vec<VectorRecord> = match ids {
            Some(ids) => ids.iter().filter_map(|id| entries.get(id)).cloned().collect(),
            None => entries.values().cloned().collect(),
        };
        if let Some(filter) = filter {
            out.retain(|r| filter.matches(&r.metadata));
        }
        // Deterministic order for callers that page or truncate
        out.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        if !include_embeddings {
            for record in &mut out {
                record.embedding.clear();
            }
        }
        Ok(out)
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&Where>,
    ) -> Result<Vec<QueryHit>> {
        let collections = self.collections.read().await;
        let Some(entries) = collections.get(collection) else {
            return Ok(vec![]);
        };

        let mut hits: Vec<QueryHit> = entries
            .values()
            .filter(|r| !r.embedding.is_empty())
            .filter(|r| filter.map(|f| f.matches(&r.metadata)).unwrap_or(true))
            .map(|r| QueryHit {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(embedding, &r.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn update(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection.to_string()).or_default();
        for record in records {
            match entries.get_mut(&record.id) {
                Some(existing) => {
                    if !record.embedding.is_empty() {
                        existing.embedding = record.embedding;
                    }
                    existing.document = record.document;
                    existing.metadata = record.metadata;
                }
                None => {
                    return Err(MemoryError::database(format!(
                        "update of unknown id {}",
                        record.id
                    )));
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(entries) = collections.get_mut(collection) {
            for id in ids {
                entries.remove(id);
            }
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map(|e| e.len()).unwrap_or(0))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, embedding: Vec<f32>, doc: &str, ty: &str) -> VectorRecord {
        let mut metadata = serde_json::Map::new();
        metadata.insert("type".into(), json!(ty));
        VectorRecord {
            id: id.to_string(),
            embedding,
            document: doc.to_string(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_add_get_roundtrip() {
        let store = InMemoryStore::new();
        store
            .add("c", vec![record("a", vec![1.0, 0.0], "doc a", "decision")])
            .await
            .unwrap();

        let got = store
            .get("c", Some(&["a".to_string()]), None, None, true)
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].document, "doc a");
        assert_eq!(got[0].embedding, vec![1.0, 0.0]);

        // Embeddings stripped when not requested
        let got = store
            .get("c", Some(&["a".to_string()]), None, None, false)
            .await
            .unwrap();
        assert!(got[0].embedding.is_empty());
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let store = InMemoryStore::new();
        store
            .add(
                "c",
                vec![
                    record("near", vec![1.0, 0.0], "near", "context"),
                    record("far", vec![0.0, 1.0], "far", "context"),
                    record("mid", vec![0.7, 0.7], "mid", "context"),
                ],
            )
            .await
            .unwrap();

        let hits = store.query("c", &[1.0, 0.0], 3, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[tokio::test]
    async fn test_query_respects_filter_and_limit() {
        let store = InMemoryStore::new();
        store
            .add(
                "c",
                vec![
                    record("a", vec![1.0, 0.0], "a", "decision"),
                    record("b", vec![0.9, 0.1], "b", "pattern"),
                    record("d", vec![0.8, 0.2], "d", "decision"),
                ],
            )
            .await
            .unwrap();

        let filter = Where::eq("type", "decision");
        let hits = store
            .query("c", &[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.id != "b"));

        let hits = store.query("c", &[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_embedding_when_empty() {
        let store = InMemoryStore::new();
        store
            .add("c", vec![record("a", vec![1.0, 0.0], "old", "context")])
            .await
            .unwrap();

        store
            .update("c", vec![record("a", vec![], "new", "decision")])
            .await
            .unwrap();

        let got = store
            .get("c", Some(&["a".to_string()]), None, None, true)
            .await
            .unwrap();
        assert_eq!(got[0].document, "new");
        assert_eq!(got[0].embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_update_unknown_id_errors() {
        let store = InMemoryStore::new();
        store.ensure_collection("c").await.unwrap();
        let err = store
            .update("c", vec![record("ghost", vec![], "x", "context")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let store = InMemoryStore::new();
        store
            .add(
                "c",
                vec![
                    record("a", vec![1.0], "a", "context"),
                    record("b", vec![1.0], "b", "context"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.count("c").await.unwrap(), 2);

        store.delete("c", &["a".to_string()]).await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);

        // Deleting a missing id is a no-op
        store.delete("c", &["ghost".to_string()]).await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_vectors_skipped_in_query() {
        let store = InMemoryStore::new();
        store
            .add(
                "c",
                vec![
                    record("real", vec![1.0, 0.0], "real", "context"),
                    record("placeholder", vec![], "session record", "session"),
                ],
            )
            .await
            .unwrap();

        let hits = store.query("c", &[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "real");
    }
}
