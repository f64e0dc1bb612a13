//! Hybrid retriever (C8): dense + sparse fan-out fused with RRF.
//!
//! For each query variant (the original query plus any expansions from the
//! query analyser, C6) this runs a semantic search against the
//! `legal_documents` collection and a BM25 search over the same chunk set,
//! then fuses every resulting ranked list with Reciprocal Rank Fusion
//! (§4.8). The candidate budget is `3 * rag_top_k` per §4.8's "retrieve
//! roughly three times as many candidates as will finally be kept".

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Result, RetrievalError};
use crate::hierarchy::ChunkStore;
use crate::search::bm25::Bm25Index;
use crate::search::rrf::{RrfConfig, reciprocal_rank_fusion};
use crate::search::vector::{Filter, VectorStore};
use std::collections::HashMap;

/// A fused retrieval hit: chunk id, fused score, and the component scores
/// that produced it (useful for reranking and diagnostics).
#[derive(Debug, Clone)]
pub struct FusedHit {
    /// Chunk id, resolved against the active [`ChunkStore`].
    pub chunk_id: String,
    /// RRF-fused score.
    pub score: f64,
    /// Dense (vector) similarity score, if the chunk was a dense hit.
    pub dense_score: Option<f32>,
    /// BM25 score, if the chunk was a sparse hit.
    pub bm25_score: Option<f64>,
}

/// Runs the hybrid retriever for a set of query variants against a
/// pre-built BM25 index and vector store, fusing per-variant dense and
/// sparse ranked lists into one list via RRF, then deduplicating across
/// variants by chunk id (keeping the best score seen for each chunk).
///
/// `collection` is typically `"legal_documents"` (§6). Unresolvable chunk
/// ids (present in the vector store but absent from `store`) are dropped
/// with a [`RetrievalError::UnresolvedHit`] recorded via `tracing`, not
/// propagated, per Design Notes (a): a single dangling point must not
/// fail the whole query.
///
/// # Errors
///
/// Returns [`RetrievalError::Fatal`] if the embedder cannot encode a query
/// variant, or if the vector store reports a fatal error.
#[allow(clippy::too_many_arguments)]
pub fn retrieve(
    query_variants: &[String],
    collection: &str,
    store: &ChunkStore,
    vector_store: &dyn VectorStore,
    bm25: Option<&Bm25Index>,
    embedder: &dyn Embedder,
    filter: Option<&Filter>,
    config: &Config,
) -> Result<Vec<FusedHit>> {
    let candidate_budget = config.rag_top_k.saturating_mul(3).max(1);
    let rrf_config = RrfConfig::new(config.rrf_k);

    let mut dense_scores: HashMap<String, f32> = HashMap::new();
    let mut sparse_scores: HashMap<String, f64> = HashMap::new();
    let mut ranked_lists: Vec<Vec<String>> = Vec::new();

    for variant in query_variants {
        let query_vector = embedder.encode_query(variant).map_err(|e| {
            RetrievalError::Fatal(format!("failed to encode query variant: {e}"))
        })?;

        let hits = vector_store.search(
            collection,
            &query_vector,
            candidate_budget,
            None,
            filter,
        )?;
        let mut dense_ranked = Vec::with_capacity(hits.len());
        for hit in hits {
            dense_scores
                .entry(hit.id.clone())
                .and_modify(|s| *s = s.max(hit.score))
                .or_insert(hit.score);
            dense_ranked.push(hit.id);
        }
        if !dense_ranked.is_empty() {
            ranked_lists.push(dense_ranked);
        }

        if let Some(index) = bm25 {
            let sparse_ranked = index.top_k(variant, candidate_budget);
            if !sparse_ranked.is_empty() {
                let mut ids = Vec::with_capacity(sparse_ranked.len());
                for (id, score) in sparse_ranked {
                    sparse_scores
                        .entry(id.clone())
                        .and_modify(|s| *s = s.max(score))
                        .or_insert(score);
                    ids.push(id);
                }
                ranked_lists.push(ids);
            }
        }
    }

    if ranked_lists.is_empty() {
        return Ok(Vec::new());
    }

    let fused = fuse_string_lists(&ranked_lists, &rrf_config);

    let mut out = Vec::with_capacity(fused.len());
    for (chunk_id, score) in fused {
        if store.get(&chunk_id).is_none() {
            tracing::warn!(chunk_id = %chunk_id, "dropping unresolved hit not present in chunk store");
            continue;
        }
        out.push(FusedHit {
            dense_score: dense_scores.get(&chunk_id).copied(),
            bm25_score: sparse_scores.get(&chunk_id).copied(),
            chunk_id,
            score,
        });
    }
    out.truncate(candidate_budget);
    Ok(out)
}

/// Drops near-duplicate candidates from a fused hit list (§4.9): hits are
/// walked best-score-first, and a hit is dropped if its BM25-tokenised
/// content has a Jaccard similarity at or above `threshold` against any
/// higher-scoring hit already kept. The higher-scoring member of a
/// near-duplicate pair always survives.
#[must_use]
pub fn dedup_jaccard(hits: Vec<FusedHit>, store: &ChunkStore, threshold: f64) -> Vec<FusedHit> {
    let mut ordered = hits;
    ordered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<FusedHit> = Vec::with_capacity(ordered.len());
    let mut kept_tokens: Vec<std::collections::HashSet<String>> = Vec::with_capacity(ordered.len());

    for hit in ordered {
        let Some(chunk) = store.get(&hit.chunk_id) else {
            continue;
        };
        let tokens: std::collections::HashSet<String> =
            crate::text::tokenise_bm25(&chunk.content).into_iter().collect();

        let is_duplicate = kept_tokens.iter().any(|other| jaccard(&tokens, other) >= threshold);
        if is_duplicate {
            continue;
        }
        kept_tokens.push(tokens);
        kept.push(hit);
    }
    kept
}

fn jaccard(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let ratio = intersection as f64 / union as f64;
        ratio
    }
}

/// [`reciprocal_rank_fusion`] operates over `i64` ids (the teacher's
/// numeric chunk ids); this crate's chunk ids are strings, so ids are
/// interned to small integers for the duration of the fusion and mapped
/// back afterwards. The RRF formula and ordering are unchanged.
fn fuse_string_lists(lists: &[Vec<String>], config: &RrfConfig) -> Vec<(String, f64)> {
    let mut intern: HashMap<&str, i64> = HashMap::new();
    let mut un_intern: Vec<&str> = Vec::new();
    let mut int_lists: Vec<Vec<i64>> = Vec::with_capacity(lists.len());

    for list in lists {
        let mut int_list = Vec::with_capacity(list.len());
        for id in list {
            let key = *intern.entry(id.as_str()).or_insert_with(|| {
                un_intern.push(id.as_str());
                (un_intern.len() - 1) as i64
            });
            int_list.push(key);
        }
        int_lists.push(int_list);
    }

    let refs: Vec<&[i64]> = int_lists.iter().map(Vec::as_slice).collect();
    reciprocal_rank_fusion(&refs, config)
        .into_iter()
        .map(|(key, score)| (un_intern[key as usize].to_string(), score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use crate::hierarchy::{Chunk, ChunkMetadata};
    use crate::search::vector::{InMemoryVectorStore, Point};
    use std::collections::HashMap as Map;

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            metadata: ChunkMetadata {
                source: Some("test".to_string()),
                chapter: None,
                chapter_title: None,
                section: None,
                section_title: None,
                article: None,
                article_title: None,
                clause: None,
                point: None,
                extra: Map::new(),
            },
            parent_id: None,
            children_ids: Vec::new(),
        }
    }

    #[test]
    fn retrieve_fuses_dense_and_sparse_hits() {
        let store = ChunkStore::build(vec![
            chunk("c1", "điểm chuẩn học viện kỹ thuật quân sự"),
            chunk("c2", "thủ tục nhập học"),
        ])
        .expect("build store");

        let embedder = FallbackEmbedder::new(8);
        let mut vstore = InMemoryVectorStore::new();
        vstore.create_collection("legal_documents", 8).expect("create");
        let v1 = embedder.embed("điểm chuẩn học viện kỹ thuật quân sự").expect("embed");
        let v2 = embedder.embed("thủ tục nhập học").expect("embed");
        vstore
            .upsert(
                "legal_documents",
                &[
                    Point { id: "c1".to_string(), vector: v1, payload: Map::new() },
                    Point { id: "c2".to_string(), vector: v2, payload: Map::new() },
                ],
            )
            .expect("upsert");

        let bm25 = Bm25Index::build(
            vec![
                ("c1", "điểm chuẩn học viện kỹ thuật quân sự"),
                ("c2", "thủ tục nhập học"),
            ],
            1.5,
            0.75,
        );

        let config = Config::default();
        let hits = retrieve(
            &["điểm chuẩn".to_string()],
            "legal_documents",
            &store,
            &vstore,
            Some(&bm25),
            &embedder,
            None,
            &config,
        )
        .expect("retrieve");

        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, "c1");
    }

    #[test]
    fn retrieve_drops_unresolved_hits() {
        let store = ChunkStore::build(vec![chunk("c1", "điểm chuẩn")]).expect("build store");
        let embedder = FallbackEmbedder::new(8);
        let mut vstore = InMemoryVectorStore::new();
        vstore.create_collection("legal_documents", 8).expect("create");
        let v_ghost = embedder.embed("ghost").expect("embed");
        vstore
            .upsert(
                "legal_documents",
                &[Point { id: "ghost".to_string(), vector: v_ghost, payload: Map::new() }],
            )
            .expect("upsert");

        let config = Config::default();
        let hits = retrieve(
            &["điểm chuẩn".to_string()],
            "legal_documents",
            &store,
            &vstore,
            None,
            &embedder,
            None,
            &config,
        )
        .expect("retrieve");

        assert!(hits.iter().all(|h| h.chunk_id != "ghost"));
    }

    #[test]
    fn dedup_jaccard_drops_near_duplicate_keeping_higher_score() {
        let store = ChunkStore::build(vec![
            chunk("c1", "điểm chuẩn học viện kỹ thuật quân sự năm nay"),
            chunk("c2", "điểm chuẩn học viện kỹ thuật quân sự năm nay nhé"),
            chunk("c3", "thủ tục nhập học hoàn toàn khác"),
        ])
        .expect("build store");

        let hits = vec![
            FusedHit { chunk_id: "c1".to_string(), score: 0.9, dense_score: None, bm25_score: None },
            FusedHit { chunk_id: "c2".to_string(), score: 0.5, dense_score: None, bm25_score: None },
            FusedHit { chunk_id: "c3".to_string(), score: 0.4, dense_score: None, bm25_score: None },
        ];

        let deduped = dedup_jaccard(hits, &store, 0.85);
        let ids: Vec<&str> = deduped.iter().map(|h| h.chunk_id.as_str()).collect();
        assert!(ids.contains(&"c1"));
        assert!(!ids.contains(&"c2"));
        assert!(ids.contains(&"c3"));
    }

    #[test]
    fn dedup_jaccard_keeps_all_when_threshold_unreachable() {
        let store = ChunkStore::build(vec![
            chunk("c1", "điểm chuẩn học viện kỹ thuật quân sự"),
            chunk("c2", "thủ tục nhập học hoàn toàn khác biệt"),
        ])
        .expect("build store");
        let hits = vec![
            FusedHit { chunk_id: "c1".to_string(), score: 0.9, dense_score: None, bm25_score: None },
            FusedHit { chunk_id: "c2".to_string(), score: 0.8, dense_score: None, bm25_score: None },
        ];
        let deduped = dedup_jaccard(hits, &store, 0.85);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn retrieve_with_no_variants_returns_empty() {
        let store = ChunkStore::build(Vec::new()).expect("build store");
        let embedder = FallbackEmbedder::new(8);
        let vstore = InMemoryVectorStore::new();
        let config = Config::default();
        let hits = retrieve(&[], "legal_documents", &store, &vstore, None, &embedder, None, &config)
            .expect("retrieve");
        assert!(hits.is_empty());
    }
}
