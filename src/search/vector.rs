//! Vector-store adapter (C4).
//!
//! A thin contract over a cosine-similarity vector database with payload
//! filters and batch upsert, matching §4.4 and the collection contract in
//! §6 (`legal_documents`, `sql_examples`, `intents`).

use crate::error::{Result, RetrievalError};
use serde_json::Value;
use std::collections::HashMap;

/// A single point to upsert: id, vector, and an opaque JSON payload (the
/// chunk's metadata plus content, round-tripped unchanged per §6).
#[derive(Debug, Clone)]
pub struct Point {
    /// Point id (usually a chunk id).
    pub id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Opaque payload, round-tripped unchanged.
    pub payload: HashMap<String, Value>,
}

/// A search hit: id, cosine score, and payload.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Point id.
    pub id: String,
    /// Cosine similarity score.
    pub score: f32,
    /// The point's payload.
    pub payload: HashMap<String, Value>,
}

/// Equality-predicate filter composition (`must`/`should`/`must_not`).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    /// All of these field/value pairs must match.
    pub must: Vec<(String, Value)>,
    /// At least one of these field/value pairs must match.
    pub should: Vec<(String, Value)>,
    /// None of these field/value pairs may match.
    pub must_not: Vec<(String, Value)>,
}

impl Filter {
    /// True if `payload` satisfies this filter.
    #[must_use]
    pub fn matches(&self, payload: &HashMap<String, Value>) -> bool {
        let must_ok = self
            .must
            .iter()
            .all(|(k, v)| payload.get(k) == Some(v));
        let should_ok = self.should.is_empty()
            || self.should.iter().any(|(k, v)| payload.get(k) == Some(v));
        let must_not_ok = self
            .must_not
            .iter()
            .all(|(k, v)| payload.get(k) != Some(v));
        must_ok && should_ok && must_not_ok
    }
}

/// Operations exposed by a vector-store backend. Implementations translate
/// transport failures to [`RetrievalError::Transient`] and schema/quota
/// failures to [`RetrievalError::Fatal`] (§4.4).
pub trait VectorStore: Send + Sync {
    /// Creates a collection with the given name and dimensionality (cosine
    /// metric). Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Fatal`] if the collection cannot be created.
    fn create_collection(&mut self, name: &str, dim: usize) -> Result<()>;

    /// Upserts points into a collection, in caller-provided batches.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Transient`] on a recoverable write failure.
    fn upsert(&mut self, name: &str, points: &[Point]) -> Result<()>;

    /// Cosine k-NN search, optionally filtered and score-thresholded.
    /// Returns hits ordered by score descending.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Transient`] on a recoverable read failure.
    fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
        min_score: Option<f32>,
        filter: Option<&Filter>,
    ) -> Result<Vec<Hit>>;

    /// Number of points in a collection.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Transient`] on a recoverable read failure.
    fn count(&self, name: &str) -> Result<usize>;

    /// Deletes every point matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Transient`] on a recoverable write failure.
    fn delete_by_filter(&mut self, name: &str, filter: &Filter) -> Result<()>;
}

/// In-memory reference [`VectorStore`] implementation, used for tests and as
/// a default when no external vector database is configured.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: HashMap<String, (usize, Vec<Point>)>,
}

impl InMemoryVectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    crate::embedding::cosine_similarity(a, b)
}

impl VectorStore for InMemoryVectorStore {
    fn create_collection(&mut self, name: &str, dim: usize) -> Result<()> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| (dim, Vec::new()));
        Ok(())
    }

    fn upsert(&mut self, name: &str, points: &[Point]) -> Result<()> {
        let entry = self
            .collections
            .entry(name.to_string())
            .or_insert_with(|| (points.first().map_or(0, |p| p.vector.len()), Vec::new()));
        for point in points {
            entry.1.retain(|p| p.id != point.id);
            entry.1.push(point.clone());
        }
        Ok(())
    }

    fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
        min_score: Option<f32>,
        filter: Option<&Filter>,
    ) -> Result<Vec<Hit>> {
        let Some((_, points)) = self.collections.get(name) else {
            return Err(RetrievalError::Fatal(format!("unknown collection: {name}")).into());
        };
        let mut hits: Vec<Hit> = points
            .iter()
            .filter(|p| filter.is_none_or(|f| f.matches(&p.payload)))
            .map(|p| Hit {
                id: p.id.clone(),
                score: cosine(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|h| min_score.is_none_or(|min| h.score >= min))
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    fn count(&self, name: &str) -> Result<usize> {
        Ok(self.collections.get(name).map_or(0, |(_, points)| points.len()))
    }

    fn delete_by_filter(&mut self, name: &str, filter: &Filter) -> Result<()> {
        if let Some((_, points)) = self.collections.get_mut(name) {
            points.retain(|p| !filter.matches(&p.payload));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>) -> Point {
        Point {
            id: id.to_string(),
            vector,
            payload: HashMap::new(),
        }
    }

    #[test]
    fn upsert_then_search_returns_closest_by_cosine() {
        let mut store = InMemoryVectorStore::new();
        store.create_collection("legal_documents", 2).expect("create");
        store
            .upsert(
                "legal_documents",
                &[point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0])],
            )
            .expect("upsert");
        let hits = store
            .search("legal_documents", &[1.0, 0.0], 1, None, None)
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn search_respects_min_score() {
        let mut store = InMemoryVectorStore::new();
        store.create_collection("c", 2).expect("create");
        store
            .upsert("c", &[point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0])])
            .expect("upsert");
        let hits = store.search("c", &[1.0, 0.0], 10, Some(0.5), None).expect("search");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn upsert_is_idempotent_on_repeated_id() {
        let mut store = InMemoryVectorStore::new();
        store.create_collection("c", 2).expect("create");
        store.upsert("c", &[point("a", vec![1.0, 0.0])]).expect("upsert");
        store.upsert("c", &[point("a", vec![0.0, 1.0])]).expect("upsert");
        assert_eq!(store.count("c").expect("count"), 1);
    }

    #[test]
    fn filter_must_restricts_results() {
        let mut store = InMemoryVectorStore::new();
        store.create_collection("c", 2).expect("create");
        let mut p = point("a", vec![1.0, 0.0]);
        p.payload.insert("kind".to_string(), Value::String("legal".to_string()));
        store.upsert("c", &[p]).expect("upsert");

        let filter = Filter {
            must: vec![("kind".to_string(), Value::String("sql".to_string()))],
            ..Default::default()
        };
        let hits = store.search("c", &[1.0, 0.0], 10, None, Some(&filter)).expect("search");
        assert!(hits.is_empty());
    }

    #[test]
    fn search_on_unknown_collection_is_fatal() {
        let store = InMemoryVectorStore::new();
        let err = store.search("missing", &[1.0], 1, None, None);
        assert!(matches!(
            err,
            Err(crate::error::Error::Retrieval(RetrievalError::Fatal(_)))
        ));
    }

    #[test]
    fn delete_by_filter_removes_matching_points() {
        let mut store = InMemoryVectorStore::new();
        store.create_collection("c", 2).expect("create");
        let mut p = point("a", vec![1.0, 0.0]);
        p.payload.insert("kind".to_string(), Value::String("legal".to_string()));
        store.upsert("c", &[p]).expect("upsert");
        let filter = Filter {
            must: vec![("kind".to_string(), Value::String("legal".to_string()))],
            ..Default::default()
        };
        store.delete_by_filter("c", &filter).expect("delete");
        assert_eq!(store.count("c").expect("count"), 0);
    }
}
