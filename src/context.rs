//! Chunk merger and context builder (C11).
//!
//! Two jobs: merging overlapping reranked candidates down to the intent's
//! `max_chunks` budget, keeping the structurally deepest chunk of any
//! overlapping pair (§4.12 steps 1–2), then rendering each surviving chunk
//! plus its enrichment (C9) into one prompt-ready context block (§4.12
//! steps 3–5).

use crate::config::Config;
use crate::embedding::Embedder;
use crate::enrich::{EnrichedItem, enrich_descendants, enrich_siblings};
use crate::error::Result;
use crate::hierarchy::{Chunk, ChunkStore};
use crate::query::ContextBudget;
use crate::rerank::RankedHit;

/// One accepted chunk plus the extra context gathered around it.
#[derive(Debug, Clone)]
pub struct ContextBlock {
    /// Source chunk id.
    pub chunk_id: String,
    /// Rendered block text, ready to concatenate into the final prompt.
    pub text: String,
}

/// Walks `ranked` best-first, keeping a candidate only if it does not
/// hierarchically overlap (ancestor/descendant, within
/// `config.max_overlap_depth`) with any already-kept candidate; stops once
/// `budget.max_chunks` have been kept (§4.12 steps 1–2).
#[must_use]
pub fn merge_overlapping(ranked: &[RankedHit], store: &ChunkStore, budget: &ContextBudget, config: &Config) -> Vec<RankedHit> {
    let mut kept: Vec<RankedHit> = Vec::with_capacity(budget.max_chunks);
    let mut kept_chunks: Vec<&Chunk> = Vec::with_capacity(budget.max_chunks);

    for candidate in ranked {
        if kept.len() >= budget.max_chunks {
            break;
        }
        let Some(chunk) = store.get(&candidate.chunk_id) else {
            continue;
        };
        let overlaps_kept = kept_chunks.iter().any(|k| store.overlaps(k, chunk, config.max_overlap_depth));
        if overlaps_kept {
            continue;
        }
        kept_chunks.push(chunk);
        kept.push(candidate.clone());
    }
    kept
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

/// Renders one accepted chunk into a labelled `=== Nguồn N ===` block: legal
/// path header, up to two parent contexts (truncated to
/// `config.parent_context_length`), the main content, a "Các mục con liên
/// quan" descendants list, and a "Các mục cùng cấp" siblings list (§4.12
/// steps 3–5).
///
/// # Errors
///
/// Returns an error if sibling scoring fails to embed a candidate.
pub fn render_block(
    index: usize,
    chunk: &Chunk,
    query: &str,
    query_vector: &[f32],
    store: &ChunkStore,
    embedder: &dyn Embedder,
    budget: &ContextBudget,
    config: &Config,
) -> Result<ContextBlock> {
    let mut out = format!("=== Nguồn {} ===\n", index + 1);

    let legal_path = chunk.metadata.legal_path();
    if !legal_path.is_empty() {
        out.push_str(&legal_path);
        out.push('\n');
    }

    if budget.include_parents {
        for parent in store.parents(chunk, 2) {
            let truncated = truncate_chars(&parent.content, config.parent_context_length);
            out.push_str(&format!("(Bối cảnh) {truncated}\n"));
        }
    }

    out.push_str(&chunk.content);
    out.push('\n');

    let descendants: Vec<EnrichedItem> = enrich_descendants(chunk, store, budget);
    if !descendants.is_empty() {
        out.push_str("Các mục con liên quan:\n");
        for item in &descendants {
            if let Some(d) = store.get(&item.chunk_id) {
                out.push_str(&format!("- {}\n", d.content));
            }
        }
    }

    let siblings = enrich_siblings(
        chunk,
        query,
        query_vector,
        store,
        embedder,
        budget,
        config.enrichment_relevance_threshold,
    )?;
    if !siblings.is_empty() {
        out.push_str("Các mục cùng cấp:\n");
        for item in &siblings {
            if let Some(s) = store.get(&item.chunk_id) {
                out.push_str(&format!("- {}\n", s.content));
            }
        }
    }

    Ok(ContextBlock { chunk_id: chunk.id.clone(), text: out })
}

/// Builds the full context from reranked hits: merges overlapping
/// candidates down to budget, then renders each survivor as a labelled
/// block, in order (§4.12).
///
/// # Errors
///
/// Returns an error if rendering any surviving chunk fails.
pub fn build_context(
    ranked: &[RankedHit],
    query: &str,
    query_vector: &[f32],
    store: &ChunkStore,
    embedder: &dyn Embedder,
    budget: &ContextBudget,
    config: &Config,
) -> Result<Vec<ContextBlock>> {
    let merged = merge_overlapping(ranked, store, budget, config);
    let mut blocks = Vec::with_capacity(merged.len());
    for (i, candidate) in merged.iter().enumerate() {
        let Some(chunk) = store.get(&candidate.chunk_id) else {
            continue;
        };
        blocks.push(render_block(i, chunk, query, query_vector, store, embedder, budget, config)?);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use crate::hierarchy::ChunkMetadata;
    use crate::query::{QueryIntent, context_budget};

    fn chunk(id: &str, parent: Option<&str>, article: Option<&str>, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            metadata: ChunkMetadata { article: article.map(ToString::to_string), ..ChunkMetadata::default() },
            parent_id: parent.map(ToString::to_string),
            children_ids: Vec::new(),
        }
    }

    fn ranked(id: &str, score: f32) -> RankedHit {
        RankedHit { chunk_id: id.to_string(), final_score: score, cross_encoder_score: 0.0, retrieval_score: score, metadata_score: 0.0 }
    }

    #[test]
    fn merge_overlapping_drops_descendant_of_already_kept_ancestor() {
        let store = ChunkStore::build(vec![
            chunk("p", None, Some("5"), "dieu cha"),
            chunk("c", Some("p"), None, "khoan con"),
        ])
        .expect("build");
        let config = Config::default();
        let budget = context_budget(QueryIntent::Specific);
        let ranked_hits = vec![ranked("p", 0.9), ranked("c", 0.8)];
        let kept = merge_overlapping(&ranked_hits, &store, &budget, &config);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "p");
    }

    #[test]
    fn merge_overlapping_keeps_unrelated_chunks_up_to_budget() {
        let store = ChunkStore::build(vec![
            chunk("a", None, None, "a"),
            chunk("b", None, None, "b"),
        ])
        .expect("build");
        let config = Config::default();
        let budget = context_budget(QueryIntent::Specific);
        let ranked_hits = vec![ranked("a", 0.9), ranked("b", 0.8)];
        let kept = merge_overlapping(&ranked_hits, &store, &budget, &config);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn render_block_includes_legal_path_and_source_label() {
        let store = ChunkStore::build(vec![chunk("c1", None, Some("5"), "noi dung dieu 5")]).expect("build");
        let chunk1 = store.get("c1").expect("c1");
        let embedder = FallbackEmbedder::new(8);
        let qv = embedder.embed("q").expect("embed");
        let config = Config::default();
        let budget = context_budget(QueryIntent::Specific);
        let block = render_block(0, chunk1, "q", &qv, &store, &embedder, &budget, &config).expect("render");
        assert!(block.text.starts_with("=== Nguồn 1 ==="));
        assert!(block.text.contains("noi dung dieu 5"));
    }

    #[test]
    fn render_block_includes_parent_context_when_present() {
        let store = ChunkStore::build(vec![
            chunk("p", None, Some("5"), "noi dung cha dai hon nhieu"),
            chunk("c", Some("p"), None, "noi dung con"),
        ])
        .expect("build");
        let child = store.get("c").expect("c");
        let embedder = FallbackEmbedder::new(8);
        let qv = embedder.embed("q").expect("embed");
        let config = Config::default();
        let budget = context_budget(QueryIntent::Specific);
        let block = render_block(0, child, "q", &qv, &store, &embedder, &budget, &config).expect("render");
        assert!(block.text.contains("(Bối cảnh)"));
    }

    #[test]
    fn build_context_renders_one_block_per_merged_chunk() {
        let store = ChunkStore::build(vec![
            chunk("a", None, None, "noi dung a"),
            chunk("b", None, None, "noi dung b"),
        ])
        .expect("build");
        let embedder = FallbackEmbedder::new(8);
        let qv = embedder.embed("q").expect("embed");
        let config = Config::default();
        let budget = context_budget(QueryIntent::Specific);
        let ranked_hits = vec![ranked("a", 0.9), ranked("b", 0.8)];
        let blocks = build_context(&ranked_hits, "q", &qv, &store, &embedder, &budget, &config).expect("build");
        assert_eq!(blocks.len(), 2);
    }
}
