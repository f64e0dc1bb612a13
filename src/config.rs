//! Tunable configuration surface for the retrieval-and-orchestration core.
//!
//! All values have defaults matching the reference design; callers typically
//! deserialize a partial override via `serde` (TOML, JSON, or environment
//! variables through an external loader) and merge it over [`Config::default`].

use serde::{Deserialize, Serialize};

/// Central configuration for every pipeline stage.
///
/// Grouped by the component it tunes; see each component's module for how the
/// field is consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of chunks the hybrid retriever fuses toward before enrichment
    /// (C8). Also the base for the dense/sparse per-variant search limit
    /// (`2 * rag_top_k`) and the candidate budget (`3 * rag_top_k`).
    pub rag_top_k: usize,

    /// Final number of reranked chunks returned to the merger (C10).
    pub reranker_top_k: usize,

    /// BM25 `k1` term-frequency saturation parameter (C3).
    pub bm25_k1: f64,

    /// BM25 `b` length-normalisation parameter (C3).
    pub bm25_b: f64,

    /// Reciprocal rank fusion constant `k` (C8).
    pub rrf_k: u32,

    /// Jaccard similarity threshold above which a candidate is treated as a
    /// near-duplicate and dropped (C8 dedup, §4.9).
    pub dedup_threshold: f64,

    /// Minimum cosine similarity for a semantic-cache hit (C7).
    pub cache_similarity_threshold: f32,

    /// Time-to-live for cache entries, in hours (C7).
    pub cache_ttl_hours: i64,

    /// Minimum confidence for the semantic router to consider a route matched
    /// rather than falling back to the LLM planner (C5).
    pub router_similarity_threshold: f32,

    /// Maximum characters of parent content included in an enriched context
    /// block (C11).
    pub parent_context_length: usize,

    /// Maximum number of SQL generation retries (C13).
    pub sql_max_retries: u32,

    /// Number of few-shot examples retrieved for SQL prompting (C13).
    pub sql_few_shot_examples: usize,

    /// Dimensionality `D` of embedding vectors produced by the configured
    /// embedding service.
    pub embedding_dimension: usize,

    /// Hard cap on the number of entries retained in the semantic cache (C7).
    pub cache_max_entries: usize,

    /// Cache sweep trigger: once the cache holds more than this many entries
    /// (including expired ones), a lazy expiry sweep runs before the next
    /// lookup (C7, §4.7).
    pub cache_sweep_threshold: usize,

    /// Minimum relevance score for a sibling/descendant to be kept during
    /// hierarchy enrichment (C9, §4.10).
    pub enrichment_relevance_threshold: f32,

    /// Maximum number of ancestor levels walked when checking hierarchy
    /// overlap between two candidates (C11, §4.12).
    pub max_overlap_depth: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rag_top_k: 5,
            reranker_top_k: 3,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            rrf_k: 60,
            dedup_threshold: 0.85,
            cache_similarity_threshold: 0.92,
            cache_ttl_hours: 24,
            router_similarity_threshold: 0.85,
            parent_context_length: 300,
            sql_max_retries: 3,
            sql_few_shot_examples: 5,
            embedding_dimension: 1024,
            cache_max_entries: 200,
            cache_sweep_threshold: 1000,
            enrichment_relevance_threshold: 0.3,
            max_overlap_depth: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_values() {
        let cfg = Config::default();
        assert_eq!(cfg.rag_top_k, 5);
        assert_eq!(cfg.reranker_top_k, 3);
        assert!((cfg.bm25_k1 - 1.5).abs() < f64::EPSILON);
        assert!((cfg.bm25_b - 0.75).abs() < f64::EPSILON);
        assert_eq!(cfg.rrf_k, 60);
        assert!((cfg.dedup_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(cfg.cache_ttl_hours, 24);
        assert_eq!(cfg.sql_max_retries, 3);
        assert_eq!(cfg.sql_few_shot_examples, 5);
        assert_eq!(cfg.cache_max_entries, 200);
        assert_eq!(cfg.cache_sweep_threshold, 1000);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: Config = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cfg, back);
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let partial = r#"{"rag_top_k": 8}"#;
        let cfg: Config = serde_json::from_str(partial).expect("deserialize");
        assert_eq!(cfg.rag_top_k, 8);
        assert_eq!(cfg.reranker_top_k, 3);
    }
}
