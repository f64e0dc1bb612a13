//! Hierarchy enricher (C9).
//!
//! Pulls in two kinds of extra context around an accepted chunk: sibling
//! chunks scored for relevance against the query (only for mid-level
//! sections, where a sibling is likely to carry a related sub-point), and
//! descendant chunks walked breadth-first without relevance gating, mirroring
//! `find_smart_descendants` in the system this was distilled from (§4.10).

use crate::embedding::{Embedder, cosine_similarity};
use crate::error::Result;
use crate::hierarchy::{Chunk, ChunkStore, SectionType};
use crate::query::ContextBudget;
use crate::text::tokenise_bm25;

/// One enriched piece of context attached to an accepted chunk.
#[derive(Debug, Clone)]
pub struct EnrichedItem {
    /// Id of the enriching chunk.
    pub chunk_id: String,
    /// Relevance score against the query, for siblings; `0.0` for
    /// descendants (not scored, per §4.10).
    pub relevance: f32,
    /// True if this item came from sibling enrichment rather than
    /// descendant enrichment (mirrors the original's `_sibling_enrichment`
    /// tag).
    pub sibling_enrichment: bool,
}

/// Sections worth enriching with siblings: top-level chapters are too
/// coarse and point-level leaves have no useful siblings of their own
/// (they're already the most specific unit), so only mid-hierarchy
/// sections qualify (§4.10).
fn is_mid_level(section_type: SectionType) -> bool {
    matches!(section_type, SectionType::Muc | SectionType::Dieu | SectionType::Khoan)
}

/// Fraction of `query`'s tokens also present in `candidate`: `|q∩c| /
/// max(1, |q|)` (§4.10's relevance overlap term) — divided by the query's
/// own token count, not the union, so full query coverage by a much longer
/// candidate still scores 1.0.
fn token_overlap(query: &str, candidate: &str) -> f32 {
    let tq: std::collections::HashSet<String> = tokenise_bm25(query).into_iter().collect();
    let tc: std::collections::HashSet<String> = tokenise_bm25(candidate).into_iter().collect();
    if tq.is_empty() || tc.is_empty() {
        return 0.0;
    }
    let intersection = tq.intersection(&tc).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = intersection as f32 / tq.len().max(1) as f32;
    ratio.min(1.0)
}

/// Scores a candidate sibling/descendant against the query: `0.7` weight on
/// embedding cosine similarity, `0.3` on token overlap (§4.10's relevance
/// formula).
fn relevance_score(query: &str, query_vector: &[f32], candidate: &Chunk, embedder: &dyn Embedder) -> Result<f32> {
    let candidate_vector = embedder.embed(&candidate.content)?;
    let cos = cosine_similarity(query_vector, &candidate_vector);
    let overlap = token_overlap(query, &candidate.content);
    Ok(0.7 * cos + 0.3 * overlap)
}

/// Finds and scores sibling chunks for `chunk`, keeping only those at or
/// above `relevance_threshold`, bounded by `budget.max_siblings`. Returns an
/// empty list for non-mid-level sections.
///
/// # Errors
///
/// Returns an error if the embedder fails to encode a candidate's content.
pub fn enrich_siblings(
    chunk: &Chunk,
    query: &str,
    query_vector: &[f32],
    store: &ChunkStore,
    embedder: &dyn Embedder,
    budget: &ContextBudget,
    relevance_threshold: f32,
) -> Result<Vec<EnrichedItem>> {
    if !is_mid_level(chunk.section_type()) || budget.max_siblings == 0 {
        return Ok(Vec::new());
    }

    let mut scored = Vec::new();
    for sibling in store.siblings(chunk, budget.max_siblings.saturating_mul(4).max(1)) {
        let score = relevance_score(query, query_vector, sibling, embedder)?;
        if score >= relevance_threshold {
            scored.push(EnrichedItem {
                chunk_id: sibling.id.clone(),
                relevance: score,
                sibling_enrichment: true,
            });
        }
    }
    scored.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(budget.max_siblings);
    Ok(scored)
}

/// Walks descendants of `chunk` breadth-first (per [`ChunkStore::descendants`],
/// already BFS-ordered), taking the first `budget.max_descendants` without
/// relevance gating (§4.10: descendants are pulled in unconditionally, unlike
/// siblings).
#[must_use]
pub fn enrich_descendants(chunk: &Chunk, store: &ChunkStore, budget: &ContextBudget) -> Vec<EnrichedItem> {
    store
        .descendants(chunk)
        .into_iter()
        .take(budget.max_descendants)
        .map(|d| EnrichedItem { chunk_id: d.id.clone(), relevance: 0.0, sibling_enrichment: false })
        .collect()
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
            metadata: ChunkMetadata {
                article: article.map(ToString::to_string),
                ..ChunkMetadata::default()
            },
            parent_id: parent.map(ToString::to_string),
            children_ids: Vec::new(),
        }
    }

    #[test]
    fn enrich_siblings_returns_empty_for_top_level_chapter() {
        let store = ChunkStore::build(vec![chunk("c1", None, None, "chuong 1")]).expect("build");
        let chuong = store.get("c1").expect("c1");
        let embedder = FallbackEmbedder::new(8);
        let budget = context_budget(QueryIntent::Specific);
        let items = enrich_siblings(chuong, "query", &[0.0; 8], &store, &embedder, &budget, 0.0).expect("ok");
        assert!(items.is_empty());
    }

    #[test]
    fn enrich_siblings_respects_relevance_threshold_and_budget() {
        let store = ChunkStore::build(vec![
            chunk("p", None, None, "dieu cha"),
            chunk("a1", Some("p"), Some("5"), "điểm chuẩn tuyển sinh quân sự"),
            chunk("a2", Some("p"), Some("5"), "thủ tục hoàn toàn không liên quan"),
        ])
        .expect("build");
        let a1 = store.get("a1").expect("a1");
        let embedder = FallbackEmbedder::new(16);
        let query_vector = embedder.embed("điểm chuẩn tuyển sinh quân sự").expect("embed");
        let budget = context_budget(QueryIntent::List);
        let items =
            enrich_siblings(a1, "điểm chuẩn tuyển sinh quân sự", &query_vector, &store, &embedder, &budget, 0.3)
                .expect("ok");
        assert!(items.len() <= budget.max_siblings);
    }

    #[test]
    fn enrich_descendants_bounded_by_budget() {
        let store = ChunkStore::build(vec![
            chunk("p", None, None, "dieu"),
            chunk("c1", Some("p"), None, "khoan 1"),
            chunk("c2", Some("p"), None, "khoan 2"),
            chunk("c3", Some("p"), None, "khoan 3"),
        ])
        .expect("build");
        let p = store.get("p").expect("p");
        let budget = context_budget(QueryIntent::Specific);
        let items = enrich_descendants(p, &store, &budget);
        assert_eq!(items.len(), budget.max_descendants.min(3));
        assert!(items.iter().all(|i| !i.sibling_enrichment));
    }

    #[test]
    fn enrich_descendants_empty_for_leaf_chunk() {
        let store = ChunkStore::build(vec![chunk("leaf", None, None, "diem a")]).expect("build");
        let leaf = store.get("leaf").expect("leaf");
        let budget = context_budget(QueryIntent::Specific);
        let items = enrich_descendants(leaf, &store, &budget);
        assert!(items.is_empty());
    }

    #[test]
    fn is_mid_level_excludes_chuong_and_unknown() {
        assert!(!is_mid_level(SectionType::Chuong));
        assert!(!is_mid_level(SectionType::Unknown));
        assert!(is_mid_level(SectionType::Dieu));
        assert!(is_mid_level(SectionType::Khoan));
        assert!(is_mid_level(SectionType::Muc));
    }

    #[test]
    fn token_overlap_divides_by_query_token_count() {
        let overlap = token_overlap("điểm chuẩn", "điểm chuẩn tuyển sinh quân sự");
        assert!((overlap - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn token_overlap_is_bounded_and_not_symmetric() {
        let full = token_overlap("điểm chuẩn", "điểm chuẩn tuyển sinh quân sự");
        let partial = token_overlap("điểm chuẩn tuyển sinh quân sự", "điểm chuẩn");
        assert!((0.0..=1.0).contains(&full));
        assert!((0.0..=1.0).contains(&partial));
        assert!(full > partial);
    }

    #[test]
    fn relevance_score_blends_cosine_and_overlap() {
        let embedder = FallbackEmbedder::new(8);
        let qv = embedder.embed("điểm chuẩn").expect("embed");
        let candidate = chunk("x", None, None, "điểm chuẩn");
        let score = relevance_score("điểm chuẩn", &qv, &candidate, &embedder).expect("ok");
        assert!(score > 0.5);
    }
}
